//! Gemini CLI adapter.
//!
//! Gemini only has custom slash commands: `commands/<ns>/<name>.toml` with a
//! required `prompt` and an optional `description`. Subdirectories below
//! `commands` form a colon-separated namespace (`git/review.toml` is
//! `/git:review`).
//!
//! Prompts may embed `{{args}}`, shell output `!{...}` and file contents
//! `@{...}`. `{{args}}` maps to the canonical `$ARGUMENTS`; the other two are
//! recorded in metadata so other formats can report them as lossy.

use super::traits::{Capability, ConversionOptions, FormatAdapter};
use super::utils::{file_name, report_foreign_metadata, WarningLog};
use crate::canonical::{CanonicalConfig, CanonicalSlashCommand, ConfigType, Metadata, Namespace};
use crate::error::SyncError;
use crate::report::{ConversionWarning, WarningLevel};
use crate::Result;
use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

const FORMAT: &str = "gemini";
const EXTENSION: &str = ".toml";

const CANONICAL_ARGS: &str = "$ARGUMENTS";
const GEMINI_ARGS: &str = "{{args}}";

static SHELL_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\{([^}]*)\}").expect("valid regex"));
static FILE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\{([^}]*)\}").expect("valid regex"));

#[derive(Debug, Default, Serialize, Deserialize)]
struct CommandFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prompt: Option<String>,
    #[serde(flatten)]
    extra: toml::Table,
}

/// Adapter for Gemini CLI custom commands.
#[derive(Debug, Default)]
pub struct GeminiAdapter {
    warnings: WarningLog,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn command_to_canonical(&self, content: &str) -> Result<CanonicalSlashCommand> {
        let file: CommandFile = toml::from_str(content)
            .map_err(|e| SyncError::parse(FORMAT, format!("invalid TOML: {e}")))?;
        let prompt = file
            .prompt
            .ok_or_else(|| SyncError::parse(FORMAT, "Missing required 'prompt' field"))?;

        let mut metadata = Metadata::new();
        let shell = captures(&SHELL_PLACEHOLDER, &prompt);
        if !shell.is_empty() {
            metadata.insert(Namespace::Gemini, "shell_placeholders", shell);
        }
        let files = captures(&FILE_PLACEHOLDER, &prompt);
        if !files.is_empty() {
            metadata.insert(Namespace::Gemini, "file_placeholders", files);
        }
        for (key, value) in &file.extra {
            metadata.insert(
                Namespace::Gemini,
                key.as_str(),
                serde_json::to_value(value).unwrap_or_default(),
            );
        }

        Ok(CanonicalSlashCommand {
            name: file.name.unwrap_or_default(),
            description: file.description.unwrap_or_default(),
            instructions: prompt.trim_end().replace(GEMINI_ARGS, CANONICAL_ARGS),
            metadata,
            source_format: Some(FORMAT.to_string()),
            ..Default::default()
        })
    }

    fn command_from_canonical(&self, command: &CanonicalSlashCommand) -> Result<String> {
        let mut extra = toml::Table::new();
        for (field, value) in command.metadata.owned_by(Namespace::Gemini) {
            if matches!(field, "shell_placeholders" | "file_placeholders" | "namespace") {
                continue;
            }
            if let Ok(value) = toml::Value::try_from(value) {
                extra.insert(field.to_string(), value);
            }
        }

        if command.argument_hint.is_some() {
            self.warnings.push(ConversionWarning::new(
                WarningLevel::Info,
                "unsupported_field",
                "argument-hint has no Gemini equivalent and was dropped",
            ));
        }
        if !command.allowed_tools.is_empty() {
            self.warnings.push(ConversionWarning::lossy(
                &command.allowed_tools.join(", "),
                "allowed-tools",
                "dropped",
                "Gemini commands cannot restrict tools",
            ));
        }
        report_foreign_metadata(&command.metadata, Namespace::Gemini, FORMAT, &self.warnings);

        let file = CommandFile {
            name: Some(command.name.clone()).filter(|n| !n.is_empty() && n != "untitled"),
            description: Some(command.description.clone()).filter(|d| !d.is_empty()),
            prompt: Some(format!(
                "{}\n",
                command.instructions.trim_end().replace(CANONICAL_ARGS, GEMINI_ARGS)
            )),
            extra,
        };
        Ok(toml::to_string_pretty(&file)?)
    }
}

impl FormatAdapter for GeminiAdapter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn can_handle(&self, path: &Path) -> bool {
        file_name(path).ends_with(EXTENSION)
    }

    fn capability(&self, config_type: ConfigType) -> Capability {
        match config_type {
            ConfigType::SlashCommand => Capability::Supported,
            ConfigType::Agent => Capability::unsupported(
                "Gemini model aliases are presets, not instruction-based agents",
            ),
            ConfigType::Permission => Capability::unsupported(
                "Gemini's folder trust model has no per-tool permission rules",
            ),
        }
    }

    fn file_extension(&self, config_type: ConfigType) -> Option<String> {
        (config_type == ConfigType::SlashCommand).then(|| EXTENSION.to_string())
    }

    fn subdirectory(&self, config_type: ConfigType) -> Option<String> {
        (config_type == ConfigType::SlashCommand).then(|| "commands".to_string())
    }

    fn to_canonical(&self, content: &str, config_type: ConfigType) -> Result<CanonicalConfig> {
        match config_type {
            ConfigType::SlashCommand => Ok(self.command_to_canonical(content)?.into()),
            other => Err(SyncError::UnsupportedConfigType {
                format: FORMAT.to_string(),
                config_type: other,
            }
            .into()),
        }
    }

    fn from_canonical(
        &self,
        canonical: &CanonicalConfig,
        config_type: ConfigType,
        _options: &ConversionOptions,
    ) -> Result<String> {
        match (canonical, config_type) {
            (CanonicalConfig::SlashCommand(cmd), ConfigType::SlashCommand) => {
                self.command_from_canonical(cmd)
            }
            (_, other) => Err(SyncError::UnsupportedConfigType {
                format: FORMAT.to_string(),
                config_type: other,
            }
            .into()),
        }
    }

    fn take_warnings(&self) -> Vec<ConversionWarning> {
        self.warnings.take()
    }

    /// Reads a command, deriving its namespaced name from the path when the
    /// file does not set one.
    fn read(&self, path: &Path, config_type: ConfigType) -> Result<CanonicalConfig> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut canonical = self
            .to_canonical(&content, config_type)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        if let CanonicalConfig::SlashCommand(cmd) = &mut canonical {
            if cmd.name.is_empty() {
                cmd.name = namespaced_name(path);
            }
            if cmd.name.contains(':') {
                cmd.metadata
                    .insert(Namespace::Gemini, "namespace", cmd.name.clone());
            }
        }
        Ok(canonical)
    }
}

fn captures(pattern: &Regex, prompt: &str) -> Vec<String> {
    pattern
        .captures_iter(prompt)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// `.../commands/git/review.toml` → `git:review`; outside a `commands`
/// directory the file stem is used.
fn namespaced_name(path: &Path) -> String {
    let stem = file_name(path)
        .strip_suffix(EXTENSION)
        .unwrap_or_default()
        .to_string();
    let parts: Vec<&str> = path
        .parent()
        .map(|p| p.iter().filter_map(|c| c.to_str()).collect())
        .unwrap_or_default();
    match parts.iter().rposition(|c| *c == "commands") {
        Some(idx) if idx + 1 < parts.len() => {
            let mut segments: Vec<&str> = parts[idx + 1..].to_vec();
            segments.push(&stem);
            segments.join(":")
        }
        _ if stem.is_empty() => "untitled".to_string(),
        _ => stem,
    }
}
