//! GitHub Copilot (VS Code) adapter.
//!
//! - Agents: `agents/<name>.agent.md` with a YAML `tools` list and VS Code
//!   model display names (`Claude Sonnet 4`).
//! - Slash commands: `prompts/<name>.prompt.md`.
//! - Permissions: `<name>.perm.json` holding the
//!   `chat.tools.terminal.autoApprove` map of command → approve flag.
//!
//! VS Code can only auto-approve (`true`) or require approval (`false`) for
//! terminal commands. Claude deny rules therefore degrade to `false`, and
//! rules for non-shell tools cannot be expressed at all; both are reported as
//! lossy conversions.

use super::frontmatter::{self, Document};
use super::traits::{Capability, ConversionOptions, FormatAdapter};
use super::utils::{file_name, report_foreign_metadata, WarningLog};
use crate::canonical::{
    CanonicalAgent, CanonicalConfig, CanonicalPermission, CanonicalSlashCommand, ConfigType,
    Metadata, Namespace,
};
use crate::error::SyncError;
use crate::models::{canonical_from_display, display_from_canonical};
use crate::report::ConversionWarning;
use crate::Result;
use serde_json::{json, Map, Value};
use serde_yaml::Mapping;
use std::path::Path;

const FORMAT: &str = "copilot";

pub(crate) const AUTO_APPROVE_KEY: &str = "chat.tools.terminal.autoApprove";

const AGENT_EXT: &str = ".agent.md";
const PROMPT_EXT: &str = ".prompt.md";
const PERMISSION_EXT: &str = ".perm.json";

const AGENT_CORE_KEYS: [&str; 4] = ["name", "description", "tools", "model"];
const PROMPT_CORE_KEYS: [&str; 5] = ["name", "description", "argument-hint", "model", "tools"];

/// Fields written explicitly by `agent_from_canonical`.
const AGENT_MANAGED_FIELDS: [&str; 3] = ["target", "argument_hint", "handoffs"];

const CANONICAL_ARGS: &str = "$ARGUMENTS";
const COPILOT_ARGS: &str = "${input:args}";

/// Adapter for GitHub Copilot configuration files.
#[derive(Debug, Default)]
pub struct CopilotAdapter {
    warnings: WarningLog,
}

impl CopilotAdapter {
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
            model: frontmatter::get_str(&frontmatter, "model").map(|m| canonical_from_display(&m)),
            metadata: extras_to_metadata(&frontmatter, &AGENT_CORE_KEYS),
            source_format: Some(FORMAT.to_string()),
        })
    }

    fn agent_from_canonical(
        &self,
        agent: &CanonicalAgent,
        options: &ConversionOptions,
    ) -> Result<String> {
        let meta = &agent.metadata;
        let mut map = Mapping::new();
        frontmatter::insert_str(&mut map, "name", agent.name.as_str());
        frontmatter::insert_str(&mut map, "description", agent.description.as_str());
        if !agent.tools.is_empty() {
            frontmatter::insert_list(&mut map, "tools", &agent.tools);
        }
        if let Some(model) = &agent.model {
            frontmatter::insert_str(&mut map, "model", display_from_canonical(model));
        }

        let target = meta
            .get(Namespace::Copilot, "target")
            .cloned()
            .unwrap_or_else(|| Value::from("vscode"));
        insert_json(&mut map, "target", &target);

        match meta.get(Namespace::Copilot, "argument_hint") {
            Some(hint) => insert_json(&mut map, "argument-hint", hint),
            None if options.add_argument_hint => {
                frontmatter::insert_str(&mut map, "argument-hint", agent.description.as_str())
            }
            None => {}
        }

        match meta.get(Namespace::Copilot, "handoffs") {
            Some(handoffs) => insert_json(&mut map, "handoffs", handoffs),
            None if options.add_handoffs => insert_json(&mut map, "handoffs", &default_handoffs()),
            None => {}
        }

        for (field, value) in meta.owned_by(Namespace::Copilot) {
            if !AGENT_MANAGED_FIELDS.contains(&field) {
                insert_json(&mut map, &field.replace('_', "-"), value);
            }
        }
        report_foreign_metadata(meta, Namespace::Copilot, FORMAT, &self.warnings);
        frontmatter::render(&map, &agent.instructions)
    }

    fn prompt_to_canonical(&self, content: &str) -> Result<CanonicalSlashCommand> {
        let Document {
            frontmatter, body, ..
        } = frontmatter::split(content, FORMAT)?;

        Ok(CanonicalSlashCommand {
            name: frontmatter::get_str(&frontmatter, "name").unwrap_or_default(),
            description: frontmatter::get_str(&frontmatter, "description").unwrap_or_default(),
            instructions: body.replace(COPILOT_ARGS, CANONICAL_ARGS),
            argument_hint: frontmatter::get_str(&frontmatter, "argument-hint"),
            model: frontmatter::get_str(&frontmatter, "model").map(|m| canonical_from_display(&m)),
            allowed_tools: frontmatter::get_list(&frontmatter, "tools"),
            metadata: extras_to_metadata(&frontmatter, &PROMPT_CORE_KEYS),
            source_format: Some(FORMAT.to_string()),
        })
    }

    fn prompt_from_canonical(&self, command: &CanonicalSlashCommand) -> Result<String> {
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
            frontmatter::insert_str(&mut map, "model", display_from_canonical(model));
        }
        if !command.allowed_tools.is_empty() {
            frontmatter::insert_list(&mut map, "tools", &command.allowed_tools);
        }
        for (field, value) in command.metadata.owned_by(Namespace::Copilot) {
            insert_json(&mut map, &field.replace('_', "-"), value);
        }
        report_foreign_metadata(&command.metadata, Namespace::Copilot, FORMAT, &self.warnings);
        frontmatter::render(&map, &command.instructions.replace(CANONICAL_ARGS, COPILOT_ARGS))
    }

    fn permission_to_canonical(&self, content: &str) -> Result<CanonicalPermission> {
        let root: Value = serde_json::from_str(content)
            .map_err(|e| SyncError::parse(FORMAT, format!("invalid permission JSON: {e}")))?;
        let Value::Object(mut root) = root else {
            return Err(SyncError::parse(FORMAT, "permission file must be a JSON object").into());
        };

        let entries = match root.remove(AUTO_APPROVE_KEY) {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(
                    SyncError::parse(FORMAT, format!("'{AUTO_APPROVE_KEY}' must be an object")).into(),
                )
            }
        };

        let mut perm = CanonicalPermission {
            source_format: Some(FORMAT.to_string()),
            ..Default::default()
        };
        let mut options = Map::new();
        for (command, value) in entries {
            let approve = match &value {
                Value::Bool(b) => *b,
                Value::Object(obj) => {
                    let approve = obj.get("approve").and_then(Value::as_bool);
                    options.insert(command.clone(), value.clone());
                    match approve {
                        Some(b) => b,
                        None => continue,
                    }
                }
                _ => continue,
            };
            let rule = rule_from_command(&command);
            if approve {
                perm.allow.push(rule);
            } else {
                perm.ask.push(rule);
            }
        }

        if !options.is_empty() {
            perm.metadata
                .insert(Namespace::Copilot, "auto_approve_options", Value::Object(options));
        }
        if !root.is_empty() {
            perm.metadata
                .insert(Namespace::Copilot, "settings", Value::Object(root));
        }
        Ok(perm)
    }

    fn permission_from_canonical(&self, perm: &CanonicalPermission) -> Result<String> {
        let mut approve = Map::new();

        // Later categories overwrite earlier ones: deny and ask beat allow.
        let categories: [(&str, &[String], bool); 3] = [
            ("allow", perm.allow.as_slice(), true),
            ("ask", perm.ask.as_slice(), false),
            ("deny", perm.deny.as_slice(), false),
        ];
        for (category, rules, flag) in categories {
            for rule in rules {
                let Some((command, kind)) = command_from_rule(rule) else {
                    self.warnings.push(ConversionWarning::lossy(
                        rule,
                        category,
                        "dropped",
                        "VS Code auto-approval only covers terminal commands",
                    ));
                    continue;
                };
                if let Some(kind) = kind {
                    self.warnings
                        .push(ConversionWarning::pattern(rule, &command, kind));
                }
                if category == "deny" {
                    self.warnings.push(ConversionWarning::lossy(
                        rule,
                        "deny",
                        "false",
                        "Claude deny rule mapped to VS Code 'false', which requires approval instead of blocking",
                    ));
                }
                approve.insert(command, Value::Bool(flag));
            }
        }

        if let Some(mode) = &perm.default_mode {
            self.warnings.push(ConversionWarning::lossy(
                &format!("defaultMode: {mode}"),
                "defaultMode",
                "dropped",
                "VS Code has no default permission mode",
            ));
        }

        if let Some(Value::Object(options)) =
            perm.metadata.get(Namespace::Copilot, "auto_approve_options")
        {
            for (command, original) in options {
                if let (Some(Value::Bool(flag)), Value::Object(obj)) =
                    (approve.get(command), original)
                {
                    let mut obj = obj.clone();
                    obj.insert("approve".into(), Value::Bool(*flag));
                    approve.insert(command.clone(), Value::Object(obj));
                }
            }
        }

        let mut root = match perm.metadata.get(Namespace::Copilot, "settings") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        root.insert(AUTO_APPROVE_KEY.into(), Value::Object(approve));
        report_foreign_metadata(&perm.metadata, Namespace::Copilot, FORMAT, &self.warnings);

        Ok(format!("{}\n", serde_json::to_string_pretty(&Value::Object(root))?))
    }
}

impl FormatAdapter for CopilotAdapter {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn can_handle(&self, path: &Path) -> bool {
        let name = file_name(path);
        [AGENT_EXT, PROMPT_EXT, PERMISSION_EXT]
            .iter()
            .any(|ext| name.ends_with(ext))
    }

    fn capability(&self, _config_type: ConfigType) -> Capability {
        Capability::Supported
    }

    fn file_extension(&self, config_type: ConfigType) -> Option<String> {
        let ext = match config_type {
            ConfigType::Agent => AGENT_EXT,
            ConfigType::SlashCommand => PROMPT_EXT,
            ConfigType::Permission => PERMISSION_EXT,
        };
        Some(ext.to_string())
    }

    fn subdirectory(&self, config_type: ConfigType) -> Option<String> {
        match config_type {
            ConfigType::Agent => Some("agents".into()),
            ConfigType::SlashCommand => Some("prompts".into()),
            ConfigType::Permission => None,
        }
    }

    fn to_canonical(&self, content: &str, config_type: ConfigType) -> Result<CanonicalConfig> {
        Ok(match config_type {
            ConfigType::Agent => self.agent_to_canonical(content)?.into(),
            ConfigType::SlashCommand => self.prompt_to_canonical(content)?.into(),
            ConfigType::Permission => self.permission_to_canonical(content)?.into(),
        })
    }

    fn from_canonical(
        &self,
        canonical: &CanonicalConfig,
        config_type: ConfigType,
        options: &ConversionOptions,
    ) -> Result<String> {
        match (canonical, config_type) {
            (CanonicalConfig::Agent(agent), ConfigType::Agent) => {
                self.agent_from_canonical(agent, options)
            }
            (CanonicalConfig::SlashCommand(cmd), ConfigType::SlashCommand) => {
                self.prompt_from_canonical(cmd)
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

fn default_handoffs() -> Value {
    json!([{
        "label": "Next Step",
        "agent": "agent",
        "prompt": "Continue",
        "send": false,
    }])
}

fn insert_json(map: &mut Mapping, key: &str, value: &Value) {
    map.insert(
        serde_yaml::Value::String(key.to_string()),
        frontmatter::json_to_yaml(value),
    );
}

fn extras_to_metadata(map: &Mapping, core: &[&str]) -> Metadata {
    let mut metadata = Metadata::new();
    for (key, value) in map {
        let Some(key) = key.as_str() else { continue };
        if !core.contains(&key) {
            metadata.insert(
                Namespace::Copilot,
                key.replace('-', "_"),
                frontmatter::yaml_to_json(value),
            );
        }
    }
    metadata
}

/// Maps a Claude-style rule to an auto-approve key.
///
/// Returns the key and, when the rule had to be rewritten, the kind of
/// rewrite. `None` means the rule is not about terminal commands.
fn command_from_rule(rule: &str) -> Option<(String, Option<&'static str>)> {
    let rule = rule.trim();
    if rule == "Bash" || rule == "Bash(*)" {
        return Some(("/.*/".to_string(), Some("wildcard_to_regex")));
    }
    let inner = rule.strip_prefix("Bash(")?.strip_suffix(')')?.trim();
    if inner.is_empty() {
        return None;
    }
    if inner.len() > 1 && inner.starts_with('/') && inner.ends_with('/') {
        return Some((inner.to_string(), None));
    }
    if let Some(prefix) = inner.strip_suffix(":*") {
        return Some((prefix.trim().to_string(), Some("prefix")));
    }
    Some((
        format!("/^{}$/", regex::escape(inner)),
        Some("exact_to_regex"),
    ))
}

/// Inverse of [`command_from_rule`].
fn rule_from_command(command: &str) -> String {
    if command == "/.*/" {
        return "Bash".to_string();
    }
    if let Some(exact) = command
        .strip_prefix("/^")
        .and_then(|c| c.strip_suffix("$/"))
        .and_then(unescape_exact)
    {
        return format!("Bash({exact})");
    }
    if command.len() > 1 && command.starts_with('/') && command.ends_with('/') {
        return format!("Bash({command})");
    }
    format!("Bash({command}:*)")
}

/// Recovers a literal from an escaped regex body, if it is one.
fn unescape_exact(pattern: &str) -> Option<String> {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            out.push(chars.next()?);
        } else {
            out.push(ch);
        }
    }
    (regex::escape(&out) == pattern).then_some(out)
}
