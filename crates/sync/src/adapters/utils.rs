//! Shared utility functions for format adapters.

use crate::canonical::{Metadata, Namespace};
use crate::report::{ConversionWarning, WarningLevel};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;

/// Returns true if the name starts with a dot (hidden file/directory).
pub fn is_hidden_component(name: &str) -> bool {
    name.starts_with('.')
}

/// Computes a SHA-256 hash of the given content, returning a lowercase hex string.
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// File name of `path`, or an empty string.
pub fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// Warnings recorded by an adapter between two `take_warnings` calls.
#[derive(Debug, Default)]
pub struct WarningLog(Mutex<Vec<ConversionWarning>>);

impl WarningLog {
    pub fn push(&self, warning: ConversionWarning) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(warning);
    }

    pub fn take(&self) -> Vec<ConversionWarning> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Records what happens to metadata owned by other formats.
///
/// Gemini shell and file placeholders change what the prompt does, so losing
/// them is a lossy conversion. Any other foreign field is dropped with a notice.
pub fn report_foreign_metadata(metadata: &Metadata, own: Namespace, format: &str, log: &WarningLog) {
    for (key, _) in metadata.foreign_to(own) {
        let warning = match (key.namespace(), key.field()) {
            (Namespace::Gemini, "shell_placeholders") => ConversionWarning::new(
                WarningLevel::Warning,
                "unsupported_feature",
                format!("Shell placeholders (!{{...}}) are not executed by {format}; they remain as literal text"),
            ),
            (Namespace::Gemini, "file_placeholders") => ConversionWarning::new(
                WarningLevel::Warning,
                "unsupported_feature",
                format!("File placeholders (@{{...}}) are not expanded by {format}; they remain as literal text"),
            ),
            _ => ConversionWarning::new(
                WarningLevel::Info,
                "unsupported_field",
                format!("Field '{key}' has no {format} equivalent and was dropped"),
            ),
        };
        log.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_hidden_component() {
        assert!(is_hidden_component(".git"));
        assert!(is_hidden_component(".settings.json"));
        assert!(!is_hidden_component("agents"));
        assert!(!is_hidden_component("a.agent.md"));
    }

    #[test]
    fn test_hash_content() {
        let hash = hash_content(b"hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_content(b"hello"));
        assert_ne!(hash, hash_content(b"hello\n"));
    }

    #[test]
    fn warning_log_take_clears() {
        let log = WarningLog::default();
        log.push(ConversionWarning::new(WarningLevel::Info, "note", "first"));

        assert_eq!(log.take().len(), 1);
        assert!(log.take().is_empty());
    }

    #[test]
    fn foreign_placeholders_are_lossy_other_fields_are_notices() {
        let mut meta = Metadata::new();
        meta.insert(Namespace::Gemini, "shell_placeholders", vec!["git diff"]);
        meta.insert(Namespace::Copilot, "target", "vscode");
        meta.insert(Namespace::Claude, "color", "blue");

        let log = WarningLog::default();
        report_foreign_metadata(&meta, Namespace::Claude, "claude", &log);
        let warnings = log.take();

        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.is_lossy() && w.message.contains("!{...}")));
        assert!(warnings
            .iter()
            .any(|w| !w.is_lossy() && w.message.contains("copilot_target")));
    }
}
