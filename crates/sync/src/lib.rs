//! Configuration sync between AI coding tools.
//!
//! Agents, slash commands and permission settings are converted between
//! tool formats through one canonical model: every [`FormatAdapter`] parses
//! its files into a [`CanonicalConfig`] and renders them back. The
//! [`SyncOrchestrator`] keeps two directories (or two single files) in step,
//! using a [`SyncStateStore`](hubsync_state::SyncStateStore) to tell new,
//! unchanged and conflicting files apart across runs.
//!
//! # Examples
//!
//! ```
//! use hubsync_sync::{convert_content, ConfigType, ConversionOptions, FormatRegistry};
//!
//! let registry = FormatRegistry::with_builtin_adapters();
//! let claude = registry.get_adapter("claude").unwrap();
//! let copilot = registry.get_adapter("copilot").unwrap();
//!
//! let agent = "---\nname: planner\ndescription: Plans work\nmodel: sonnet\n---\nPlan it.\n";
//! let converted = convert_content(
//!     claude.as_ref(),
//!     copilot.as_ref(),
//!     agent,
//!     ConfigType::Agent,
//!     &ConversionOptions::default(),
//! )
//! .unwrap();
//!
//! assert!(converted.content.contains("model: Claude Sonnet 4"));
//! assert!(!converted.is_lossy());
//! ```

#![deny(unsafe_code)]

pub mod adapters;
pub mod canonical;
pub mod convert;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod report;

pub use adapters::{
    Capability, ClaudeAdapter, ConversionOptions, CopilotAdapter, FormatAdapter, GeminiAdapter,
};
pub use canonical::{
    CanonicalAgent, CanonicalConfig, CanonicalPermission, CanonicalSlashCommand, ConfigType,
    Metadata, MetadataKey, Namespace,
};
pub use convert::{convert_content, convert_file, Conversion};
pub use error::SyncError;
pub use orchestrator::{
    parse_direction, ConflictResolver, FilePair, FileSide, NewestWins, SkipConflicts,
    SyncAction, SyncDirection, SyncOrchestrator, SyncParams, SyncPlan,
};
pub use registry::FormatRegistry;
pub use report::{
    ConversionReport, ConversionWarning, PairFailure, SyncReport, SyncStats, WarningDetail,
    WarningLevel,
};

/// Error type for sync operations.
pub type Error = anyhow::Error;

/// Result type for sync operations.
pub type Result<T> = anyhow::Result<T>;
