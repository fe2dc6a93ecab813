//! The two run modes: directory sync and single-file conversion.

mod convert;
mod sync;

pub(crate) use convert::handle_convert_command;
pub(crate) use sync::handle_sync_command;
