//! One-shot conversions between two formats, without sync state.

use crate::adapters::{ConversionOptions, FormatAdapter};
use crate::canonical::{CanonicalConfig, ConfigType};
use crate::error::SyncError;
use crate::report::ConversionWarning;
use crate::Result;
use std::path::Path;

/// Rendered content plus every warning the read and the render produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub content: String,
    pub warnings: Vec<ConversionWarning>,
}

impl Conversion {
    /// Whether any warning would fail strict mode.
    pub fn is_lossy(&self) -> bool {
        self.warnings.iter().any(ConversionWarning::is_lossy)
    }
}

fn ensure_supported(adapter: &dyn FormatAdapter, config_type: ConfigType) -> Result<()> {
    if adapter.supports(config_type) {
        Ok(())
    } else {
        Err(SyncError::UnsupportedConfigType {
            format: adapter.format_name().to_string(),
            config_type,
        }
        .into())
    }
}

/// Render `canonical` with `target`, collecting the render's warnings.
pub(crate) fn render(
    target: &dyn FormatAdapter,
    canonical: &CanonicalConfig,
    config_type: ConfigType,
    options: &ConversionOptions,
    warnings: &mut Vec<ConversionWarning>,
) -> Result<String> {
    let rendered = target.from_canonical(canonical, config_type, options);
    warnings.extend(target.take_warnings());
    rendered
}

/// Read `path` with `source`, collecting the parse's warnings.
pub(crate) fn read(
    source: &dyn FormatAdapter,
    path: &Path,
    config_type: ConfigType,
    warnings: &mut Vec<ConversionWarning>,
) -> Result<CanonicalConfig> {
    let canonical = source.read(path, config_type);
    warnings.extend(source.take_warnings());
    canonical
}

/// Convert in-memory `content` from `source`'s format to `target`'s.
pub fn convert_content(
    source: &dyn FormatAdapter,
    target: &dyn FormatAdapter,
    content: &str,
    config_type: ConfigType,
    options: &ConversionOptions,
) -> Result<Conversion> {
    ensure_supported(source, config_type)?;
    ensure_supported(target, config_type)?;

    let mut warnings = Vec::new();
    let canonical = source.to_canonical(content, config_type);
    warnings.extend(source.take_warnings());
    let content = render(target, &canonical?, config_type, options, &mut warnings)?;
    Ok(Conversion { content, warnings })
}

/// Convert the file at `path`. Nothing is written.
pub fn convert_file(
    source: &dyn FormatAdapter,
    target: &dyn FormatAdapter,
    path: &Path,
    config_type: ConfigType,
    options: &ConversionOptions,
) -> Result<Conversion> {
    ensure_supported(source, config_type)?;
    ensure_supported(target, config_type)?;

    let mut warnings = Vec::new();
    let canonical = read(source, path, config_type, &mut warnings)?;
    let content = render(target, &canonical, config_type, options, &mut warnings)?;
    tracing::debug!(
        path = %path.display(),
        from = source.format_name(),
        to = target.format_name(),
        warnings = warnings.len(),
        "converted file"
    );
    Ok(Conversion { content, warnings })
}
