//! Distinguished errors that callers branch on.
//!
//! Library functions return [`crate::Result`]; the variants below travel
//! inside it and can be recovered with `err.downcast_ref::<SyncError>()`.

use crate::canonical::ConfigType;
use crate::report::ConversionWarning;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// No adapter is registered under the requested format name.
    #[error("Unknown format '{name}' (available: {})", available.join(", "))]
    UnknownFormat {
        /// The name that failed to resolve.
        name: String,
        /// Formats that are registered.
        available: Vec<String>,
    },

    /// The adapter exists but cannot handle the config type.
    #[error("Format '{format}' does not support config type '{config_type}'")]
    UnsupportedConfigType {
        format: String,
        config_type: ConfigType,
    },

    /// A second adapter claimed an already registered format name.
    #[error("Format '{name}' is already registered by {existing}; refusing to register {offered}")]
    DuplicateFormat {
        name: String,
        existing: String,
        offered: String,
    },

    /// Strict mode found lossy conversions; nothing was written.
    #[error(
        "Lossy conversions detected with --strict flag ({} warning(s)): {}",
        warnings.len(),
        summarize(warnings)
    )]
    StrictModeViolation { warnings: Vec<ConversionWarning> },

    /// A file pair with neither side present.
    #[error("File pair '{base_name}' has neither a source nor a target path")]
    InvalidFilePair { base_name: String },

    /// Content an adapter could not parse.
    #[error("Failed to parse {format} content: {message}")]
    Parse { format: String, message: String },
}

impl SyncError {
    pub(crate) fn parse(format: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            format: format.to_string(),
            message: message.into(),
        }
    }
}

fn summarize(warnings: &[ConversionWarning]) -> String {
    warnings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
