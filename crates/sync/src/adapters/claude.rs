//! Claude Code adapter.
//!
//! - Agents: `agents/<name>.md` with `name`, `description`, `tools`
//!   (comma-separated), `model`, plus extras such as `permissionMode`.
//! - Slash commands: `commands/<name>.md`; frontmatter is optional and the
//!   command name is the file name.
//! - Permissions: `settings.json` (or `settings.local.json`) holding a
//!   `permissions` object with `allow`, `deny` and `ask` rule lists.

use super::frontmatter::{self, Document};
use super::traits::{Capability, ConversionOptions, FormatAdapter};
use super::utils::{file_name, report_foreign_metadata, WarningLog};
use crate::canonical::{
    CanonicalAgent, CanonicalConfig, CanonicalPermission, CanonicalSlashCommand, ConfigType,
    Metadata, Namespace,
};
use crate::error::SyncError;
use crate::report::ConversionWarning;
use crate::Result;
use serde_json::{Map, Value};
use serde_yaml::Mapping;
use std::path::Path;

const FORMAT: &str = "claude";

/// Compound suffixes that belong to other formats.
const FOREIGN_SUFFIXES: [&str; 3] = [".agent.md", ".prompt.md", ".perm.json"];

/// Frontmatter keys stored under a different metadata field name.
const RENAMED_KEYS: [(&str, &str); 1] = [("permissionMode", "permission_mode")];

const AGENT_CORE_KEYS: [&str; 4] = ["name", "description", "tools", "model"];
const COMMAND_CORE_KEYS: [&str; 5] = ["name", "description", "argument-hint", "model", "allowed-tools"];
const PERMISSION_LISTS: [&str; 3] = ["allow", "deny", "ask"];

/// Adapter for Claude Code configuration files.
#[derive(Debug, Default)]
pub struct ClaudeAdapter {
    warnings: WarningLog,
}

impl ClaudeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn agent_to_canonical(&self, content: &str) -> Result<CanonicalAgent> {
        let Document {
            frontmatter, body, ..
        } = frontmatter::split(content, FORMAT)?;

        Ok(CanonicalAgent {
            name: frontmatter::get_str(&frontmatter, "name").unwrap_or_default(),
            description: frontmatter::get_str(&frontmatter, "description").unwrap_or_default(),
            instructions: body,
            tools: frontmatter::get_list(&frontmatter, "tools"),
            model: frontmatter::get_str(&frontmatter, "model"),
            metadata: extras_to_metadata(&frontmatter, &AGENT_CORE_KEYS),
            source_format: Some(FORMAT.to_string()),
        })
    }

    fn agent_from_canonical(&self, agent: &CanonicalAgent) -> Result<String> {
        let mut map = Mapping::new();
        frontmatter::insert_str(&mut map, "name", agent.name.as_str());
        frontmatter::insert_str(&mut map, "description", agent.description.as_str());
        if !agent.tools.is_empty() {
            frontmatter::insert_str(&mut map, "tools", agent.tools.join(", "));
        }
        if let Some(model) = &agent.model {
            frontmatter::insert_str(&mut map, "model", model.as_str());
        }
        metadata_to_extras(&agent.metadata, &mut map);
        report_foreign_metadata(&agent.metadata, Namespace::Claude, FORMAT, &self.warnings);
        frontmatter::render(&map, &agent.instructions)
    }

    fn command_to_canonical(&self, content: &str) -> Result<CanonicalSlashCommand> {
        let Document {
            frontmatter, body, ..
        } = frontmatter::split(content, FORMAT)?;

        Ok(CanonicalSlashCommand {
            name: frontmatter::get_str(&frontmatter, "name").unwrap_or_default(),
            description: frontmatter::get_str(&frontmatter, "description").unwrap_or_default(),
            instructions: body,
            argument_hint: argument_hint(&frontmatter),
            model: frontmatter::get_str(&frontmatter, "model"),
            allowed_tools: frontmatter::get_list(&frontmatter, "allowed-tools"),
            metadata: extras_to_metadata(&frontmatter, &COMMAND_CORE_KEYS),
            source_format: Some(FORMAT.to_string()),
        })
    }

    fn command_from_canonical(&self, command: &CanonicalSlashCommand) -> Result<String> {
        let mut map = Mapping::new();
        if !command.name.is_empty() {
            frontmatter::insert_str(&mut map, "name", command.name.as_str());
        }
        if !command.description.is_empty() {
            frontmatter::insert_str(&mut map, "description", command.description.as_str());
        }
        if let Some(hint) = &command.argument_hint {
            frontmatter::insert_str(&mut map, "argument-hint", hint.as_str());
        }
        if let Some(model) = &command.model {
            frontmatter::insert_str(&mut map, "model", model.as_str());
        }
        if !command.allowed_tools.is_empty() {
            frontmatter::insert_str(&mut map, "allowed-tools", command.allowed_tools.join(", "));
        }
        metadata_to_extras(&command.metadata, &mut map);
        report_foreign_metadata(&command.metadata, Namespace::Claude, FORMAT, &self.warnings);
        frontmatter::render(&map, &command.instructions)
    }

    fn permission_to_canonical(&self, content: &str) -> Result<CanonicalPermission> {
        let root: Value = serde_json::from_str(content)
            .map_err(|e| SyncError::parse(FORMAT, format!("invalid settings JSON: {e}")))?;
        let Value::Object(mut root) = root else {
            return Err(SyncError::parse(FORMAT, "settings must be a JSON object").into());
        };

        let mut permissions = match root.remove("permissions") {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(SyncError::parse(FORMAT, "'permissions' must be a JSON object").into())
            }
        };

        let [allow, deny, ask] = PERMISSION_LISTS.map(|key| string_list(permissions.remove(key)));
        let default_mode = match permissions.remove("defaultMode") {
            Some(Value::String(mode)) => Some(mode),
            _ => None,
        };

        let mut metadata = Metadata::new();
        if !permissions.is_empty() {
            metadata.insert(Namespace::Claude, "permission_settings", Value::Object(permissions));
        }
        if !root.is_empty() {
            metadata.insert(Namespace::Claude, "settings", Value::Object(root));
        }

        Ok(CanonicalPermission {
            allow,
            deny,
            ask,
            default_mode,
            metadata,
            source_format: Some(FORMAT.to_string()),
        })
    }

    fn permission_from_canonical(&self, perm: &CanonicalPermission) -> Result<String> {
        let mut root = match perm.metadata.get(Namespace::Claude, "settings") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        let mut permissions = match perm.metadata.get(Namespace::Claude, "permission_settings") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        permissions.insert("allow".into(), Value::from(perm.allow.clone()));
        permissions.insert("deny".into(), Value::from(perm.deny.clone()));
        permissions.insert("ask".into(), Value::from(perm.ask.clone()));
        if let Some(mode) = &perm.default_mode {
            permissions.insert("defaultMode".into(), Value::String(mode.clone()));
        }
        root.insert("permissions".into(), Value::Object(permissions));

        report_foreign_metadata(&perm.metadata, Namespace::Claude, FORMAT, &self.warnings);

        Ok(format!("{}\n", serde_json::to_string_pretty(&Value::Object(root))?))
    }
}

impl FormatAdapter for ClaudeAdapter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn can_handle(&self, path: &Path) -> bool {
        let name = file_name(path);
        (name.ends_with(".md") || name.ends_with(".json"))
            && !FOREIGN_SUFFIXES.iter().any(|s| name.ends_with(s))
    }

    fn capability(&self, _config_type: ConfigType) -> Capability {
        Capability::Supported
    }

    fn file_extension(&self, config_type: ConfigType) -> Option<String> {
        let ext = match config_type {
            ConfigType::Agent | ConfigType::SlashCommand => ".md",
            ConfigType::Permission => ".json",
        };
        Some(ext.to_string())
    }

    fn subdirectory(&self, config_type: ConfigType) -> Option<String> {
        match config_type {
            ConfigType::Agent => Some("agents".into()),
            ConfigType::SlashCommand => Some("commands".into()),
            ConfigType::Permission => None,
        }
    }

    fn to_canonical(&self, content: &str, config_type: ConfigType) -> Result<CanonicalConfig> {
        Ok(match config_type {
            ConfigType::Agent => self.agent_to_canonical(content)?.into(),
            ConfigType::SlashCommand => self.command_to_canonical(content)?.into(),
            ConfigType::Permission => self.permission_to_canonical(content)?.into(),
        })
    }

    fn from_canonical(
        &self,
        canonical: &CanonicalConfig,
        config_type: ConfigType,
        _options: &ConversionOptions,
    ) -> Result<String> {
        match (canonical, config_type) {
            (CanonicalConfig::Agent(agent), ConfigType::Agent) => self.agent_from_canonical(agent),
            (CanonicalConfig::SlashCommand(cmd), ConfigType::SlashCommand) => {
                self.command_from_canonical(cmd)
            }
            (CanonicalConfig::Permission(perm), ConfigType::Permission) => {
                self.permission_from_canonical(perm)
            }
            (other, requested) => anyhow::bail!(
                "Cannot render a {} record as a {FORMAT} {requested}",
                other.config_type()
            ),
        }
    }

    fn take_warnings(&self) -> Vec<ConversionWarning> {
        self.warnings.take()
    }
}

/// `argument-hint` as a string; a YAML list such as `[file]` parses as a
/// sequence and is folded back into bracket form.
fn argument_hint(map: &Mapping) -> Option<String> {
    match map.get("argument-hint")? {
        serde_yaml::Value::Sequence(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| format!("[{s}]")))
                .collect::<Vec<_>>()
                .join(" "),
        ),
        _ => frontmatter::get_str(map, "argument-hint"),
    }
}

fn extras_to_metadata(map: &Mapping, core: &[&str]) -> Metadata {
    let mut metadata = Metadata::new();
    for (key, value) in map {
        let Some(key) = key.as_str() else { continue };
        if core.contains(&key) {
            continue;
        }
        let field = RENAMED_KEYS
            .iter()
            .find(|(raw, _)| *raw == key)
            .map(|(_, field)| *field)
            .unwrap_or(key);
        metadata.insert(Namespace::Claude, field, frontmatter::yaml_to_json(value));
    }
    metadata
}

fn metadata_to_extras(metadata: &Metadata, map: &mut Mapping) {
    for (field, value) in metadata.owned_by(Namespace::Claude) {
        let key = RENAMED_KEYS
            .iter()
            .find(|(_, f)| *f == field)
            .map(|(raw, _)| *raw)
            .unwrap_or(field);
        map.insert(
            serde_yaml::Value::String(key.to_string()),
            frontmatter::json_to_yaml(value),
        );
    }
}

fn string_list(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
