//! The contract every format adapter implements.

use crate::canonical::{CanonicalConfig, ConfigType};
use crate::report::ConversionWarning;
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Whether an adapter can handle a config type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Supported,
    Unsupported { reason: String },
}

impl Capability {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Supported)
    }
}

/// Options forwarded to `from_canonical`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Emit an `argument-hint` field even when the source had none.
    #[serde(default)]
    pub add_argument_hint: bool,
    /// Emit a default `handoffs` block even when the source had none.
    #[serde(default)]
    pub add_handoffs: bool,
}

#[cfg(test)]
use mockall::automock;

/// Converts one tool's on-disk representation to and from the canonical model.
///
/// Conversions record non-fatal findings internally; callers drain them with
/// [`take_warnings`](Self::take_warnings) right after each call so warnings
/// are attributed to the conversion that produced them.
#[cfg_attr(test, automock)]
pub trait FormatAdapter: Send + Sync {
    /// Unique registry key (e.g. "claude", "copilot").
    fn format_name(&self) -> &str;

    /// Whether `path` looks like a file in this format.
    fn can_handle(&self, path: &Path) -> bool;

    /// Support for one config type.
    fn capability(&self, config_type: ConfigType) -> Capability;

    /// Suffix used to name files of `config_type`, including the leading dot.
    fn file_extension(&self, config_type: ConfigType) -> Option<String>;

    /// Profile subdirectory holding files of `config_type`; `None` is the profile root.
    fn subdirectory(&self, config_type: ConfigType) -> Option<String>;

    /// Parse file content into the canonical model.
    fn to_canonical(&self, content: &str, config_type: ConfigType) -> Result<CanonicalConfig>;

    /// Render a canonical record as file content.
    fn from_canonical(
        &self,
        canonical: &CanonicalConfig,
        config_type: ConfigType,
        options: &ConversionOptions,
    ) -> Result<String>;

    /// Drain warnings recorded since the last call.
    fn take_warnings(&self) -> Vec<ConversionWarning>;

    /// Config types this adapter supports.
    fn supported_config_types(&self) -> Vec<ConfigType> {
        ConfigType::ALL
            .into_iter()
            .filter(|ct| self.capability(*ct).is_supported())
            .collect()
    }

    fn supports(&self, config_type: ConfigType) -> bool {
        self.capability(config_type).is_supported()
    }

    /// Implementing type, for diagnostics.
    fn implementation(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Read and parse a file. Records without a name take the file's base name.
    fn read(&self, path: &Path, config_type: ConfigType) -> Result<CanonicalConfig> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut canonical = self
            .to_canonical(&content, config_type)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        if let Some(base) = self.base_name(path, config_type) {
            canonical.fill_missing_name(&base);
        }
        Ok(canonical)
    }

    /// Render and write a file, creating parent directories.
    fn write(
        &self,
        canonical: &CanonicalConfig,
        path: &Path,
        config_type: ConfigType,
        options: &ConversionOptions,
    ) -> Result<()> {
        let content = self.from_canonical(canonical, config_type, options)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// File name with this format's suffix for `config_type` removed.
    fn base_name(&self, path: &Path, config_type: ConfigType) -> Option<String> {
        let file_name = path.file_name()?.to_str()?;
        let extension = self.file_extension(config_type)?;
        file_name
            .strip_suffix(extension.as_str())
            .filter(|stem| !stem.is_empty())
            .map(str::to_string)
    }
}
