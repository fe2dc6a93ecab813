//! Command-line entry point for `hubsync`.
//!
//! Argument handling lives in [`cli`], dispatch and logging setup in [`app`];
//! the conversion and sync work itself is done by `hubsync_sync`.

mod app;
mod cli;
mod commands;
mod resolver;

use std::process::ExitCode;

fn main() -> ExitCode {
    app::run()
}
