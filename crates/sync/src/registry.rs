//! Registry of format adapters.

use crate::adapters::utils::{file_name, is_hidden_component};
use crate::adapters::{ClaudeAdapter, CopilotAdapter, FormatAdapter, GeminiAdapter};
use crate::canonical::ConfigType;
use crate::error::SyncError;
use crate::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

/// Adapters indexed by format name.
#[derive(Clone, Default)]
pub struct FormatRegistry {
    adapters: BTreeMap<String, Arc<dyn FormatAdapter>>,
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.list_formats())
            .finish()
    }
}

impl FormatRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in claude, copilot and gemini adapters.
    pub fn with_builtin_adapters() -> Self {
        let mut registry = Self::new();
        let builtins: [Arc<dyn FormatAdapter>; 3] = [
            Arc::new(ClaudeAdapter::new()),
            Arc::new(CopilotAdapter::new()),
            Arc::new(GeminiAdapter::new()),
        ];
        for adapter in builtins {
            let name = adapter.format_name().to_string();
            registry.adapters.insert(name, adapter);
        }
        registry
    }

    /// Register an adapter. Fails if its format name is already taken.
    pub fn register(&mut self, adapter: Arc<dyn FormatAdapter>) -> Result<()> {
        let name = adapter.format_name().to_string();
        if let Some(existing) = self.adapters.get(&name) {
            return Err(SyncError::DuplicateFormat {
                name,
                existing: existing.implementation().to_string(),
                offered: adapter.implementation().to_string(),
            }
            .into());
        }
        tracing::debug!(format = %name, "registered format adapter");
        self.adapters.insert(name, adapter);
        Ok(())
    }

    /// Remove an adapter. Removing an unknown name is a no-op.
    pub fn unregister(&mut self, name: &str) {
        self.adapters.remove(name);
    }

    /// Adapter registered under exactly `name`.
    pub fn get_adapter(&self, name: &str) -> Option<Arc<dyn FormatAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Like [`get_adapter`](Self::get_adapter) but an unknown name is an error.
    pub fn require_adapter(&self, name: &str) -> Result<Arc<dyn FormatAdapter>> {
        self.get_adapter(name).ok_or_else(|| {
            SyncError::UnknownFormat {
                name: name.to_string(),
                available: self.list_formats(),
            }
            .into()
        })
    }

    /// Registered format names, sorted.
    pub fn list_formats(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Adapter that accepts `path`.
    ///
    /// When several adapters accept the path, the one whose matching file
    /// suffix is longest wins (`x.agent.md` prefers `.agent.md` over `.md`);
    /// remaining ties go to the alphabetically first format name. The result
    /// does not depend on registration order.
    pub fn detect_format(&self, path: &Path) -> Option<Arc<dyn FormatAdapter>> {
        let name = file_name(path);
        self.adapters
            .values()
            .filter(|adapter| adapter.can_handle(path))
            .map(|adapter| (matched_suffix_len(adapter.as_ref(), name), adapter))
            // max_by_key keeps the last maximum; Reverse keeps the first name.
            .max_by_key(|(len, adapter)| {
                (*len, std::cmp::Reverse(adapter.format_name().to_string()))
            })
            .map(|(_, adapter)| Arc::clone(adapter))
    }

    /// Whether `format` is registered and supports `config_type`.
    pub fn supports_config_type(&self, format: &str, config_type: ConfigType) -> bool {
        self.adapters
            .get(format)
            .is_some_and(|adapter| adapter.supports(config_type))
    }

    /// Whether a `config_type` conversion from `source` to `target` is possible.
    pub fn validate_conversion_support(
        &self,
        source: &str,
        target: &str,
        config_type: ConfigType,
    ) -> bool {
        self.supports_config_type(source, config_type)
            && self.supports_config_type(target, config_type)
    }

    /// Names of formats supporting `config_type`.
    pub fn get_formats_supporting(&self, config_type: ConfigType) -> BTreeSet<String> {
        self.adapters
            .iter()
            .filter(|(_, adapter)| adapter.supports(config_type))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Config type of a single file under `format`'s naming rules.
    pub fn detect_config_type(&self, path: &Path, format: &str) -> Option<ConfigType> {
        classify(self.adapters.get(format)?.as_ref(), path)
    }

    /// Count files in `dir` per config type, using `format`'s naming rules.
    ///
    /// Hidden entries are skipped. When several config types share a suffix,
    /// the type whose profile subdirectory appears in the file's path wins,
    /// otherwise the first in [`ConfigType::ALL`] order. Only positive counts
    /// are returned; an unknown format or missing directory gives an empty map.
    pub fn detect_config_types_in_directory(
        &self,
        dir: &Path,
        format: &str,
    ) -> BTreeMap<ConfigType, usize> {
        let mut counts = BTreeMap::new();
        let Some(adapter) = self.adapters.get(format) else {
            return counts;
        };
        if !dir.is_dir() {
            return counts;
        }

        let entries = WalkDir::new(dir)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || !is_hidden_component(&e.file_name().to_string_lossy())
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file());
        for entry in entries {
            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            if let Some(config_type) = classify(adapter.as_ref(), relative) {
                *counts.entry(config_type).or_insert(0) += 1;
            }
        }
        counts
    }
}

fn matched_suffix_len(adapter: &dyn FormatAdapter, name: &str) -> usize {
    ConfigType::ALL
        .into_iter()
        .filter_map(|ct| adapter.file_extension(ct))
        .filter(|ext| name.ends_with(ext.as_str()))
        .map(|ext| ext.len())
        .max()
        .unwrap_or(0)
}

fn classify(adapter: &dyn FormatAdapter, relative: &Path) -> Option<ConfigType> {
    if !adapter.can_handle(relative) {
        return None;
    }
    let name = file_name(relative);
    let candidates: Vec<(ConfigType, String)> = ConfigType::ALL
        .into_iter()
        .filter(|ct| adapter.supports(*ct))
        .filter_map(|ct| adapter.file_extension(ct).map(|ext| (ct, ext)))
        .filter(|(_, ext)| name.ends_with(ext.as_str()) && name.len() > ext.len())
        .collect();

    let longest = candidates.iter().map(|(_, ext)| ext.len()).max()?;
    let candidates: Vec<ConfigType> = candidates
        .into_iter()
        .filter(|(_, ext)| ext.len() == longest)
        .map(|(ct, _)| ct)
        .collect();

    let in_subdirectory = |ct: &ConfigType| {
        adapter.subdirectory(*ct).is_some_and(|sub| {
            relative
                .parent()
                .is_some_and(|parent| parent.iter().any(|c| c.to_str() == Some(sub.as_str())))
        })
    };
    candidates
        .iter()
        .copied()
        .find(in_subdirectory)
        .or_else(|| candidates.first().copied())
}
