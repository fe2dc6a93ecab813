//! Persisted sync state and environment configuration for hubsync.
//!
//! This crate provides:
//! - [`SyncStateStore`], the durable record of the last synchronized
//!   modification times and actions per file, keyed by directory pair.
//! - Environment helpers that resolve where that record lives.

pub mod env;
pub mod store;

pub use env::{default_state_file, env_assume_yes, home_dir, resolve_state_file};
pub use store::{FileState, PairState, SyncStateStore};
