//! Format-neutral records every adapter converts to and from.
//!
//! Fields shared by all tools live on the records themselves. Fields that
//! only one tool understands travel in [`Metadata`], a side-table whose keys
//! are owned by exactly one producing [`Namespace`], so an adapter can always
//! tell which extras it wrote and must restore on a round trip.

use anyhow::bail;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of configuration file being converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigType {
    Agent,
    Permission,
    SlashCommand,
}

impl ConfigType {
    pub const ALL: [ConfigType; 3] = [Self::Agent, Self::Permission, Self::SlashCommand];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Permission => "permission",
            Self::SlashCommand => "slash-command",
        }
    }
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agent" => Ok(Self::Agent),
            "permission" => Ok(Self::Permission),
            "slash-command" | "slash_command" => Ok(Self::SlashCommand),
            other => bail!("Unknown config type '{other}' (expected agent, permission or slash-command)"),
        }
    }
}

/// Producers allowed to own metadata keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Claude,
    Copilot,
    Gemini,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Self::Claude, Self::Copilot, Self::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Copilot => "copilot",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata key rendered as `{namespace}_{field}`, e.g. `copilot_handoffs`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetadataKey {
    namespace: Namespace,
    field: String,
}

impl MetadataKey {
    pub fn new(namespace: Namespace, field: impl Into<String>) -> Self {
        Self {
            namespace,
            field: field.into(),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.namespace, self.field)
    }
}

impl FromStr for MetadataKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for namespace in Namespace::ALL {
            if let Some(field) = s
                .strip_prefix(namespace.as_str())
                .and_then(|rest| rest.strip_prefix('_'))
            {
                if !field.is_empty() {
                    return Ok(Self::new(namespace, field));
                }
            }
        }
        bail!("Metadata key '{s}' has no known namespace prefix")
    }
}

/// Namespaced side-table of format-specific extras.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata(BTreeMap<MetadataKey, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        namespace: Namespace,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Option<Value> {
        self.0.insert(MetadataKey::new(namespace, field), value.into())
    }

    pub fn get(&self, namespace: Namespace, field: &str) -> Option<&Value> {
        self.0.get(&MetadataKey::new(namespace, field))
    }

    pub fn get_str(&self, namespace: Namespace, field: &str) -> Option<&str> {
        self.get(namespace, field).and_then(Value::as_str)
    }

    pub fn contains(&self, namespace: Namespace, field: &str) -> bool {
        self.get(namespace, field).is_some()
    }

    pub fn remove(&mut self, namespace: Namespace, field: &str) -> Option<Value> {
        self.0.remove(&MetadataKey::new(namespace, field))
    }

    /// Entries owned by `namespace`, as `(field, value)`.
    pub fn owned_by(&self, namespace: Namespace) -> impl Iterator<Item = (&str, &Value)> {
        self.0
            .iter()
            .filter(move |(k, _)| k.namespace == namespace)
            .map(|(k, v)| (k.field.as_str(), v))
    }

    /// Entries owned by any namespace other than `namespace`.
    pub fn foreign_to(&self, namespace: Namespace) -> impl Iterator<Item = (&MetadataKey, &Value)> {
        self.0.iter().filter(move |(k, _)| k.namespace != namespace)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetadataKey, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies entries from `other` whose keys are not present yet.
    pub fn merge_missing(&mut self, other: &Metadata) {
        for (key, value) in &other.0 {
            self.0.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

/// An agent definition (system prompt plus tool and model selection).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalAgent {
    pub name: String,
    pub description: String,
    /// Markdown body used as the agent's instructions.
    pub instructions: String,
    pub tools: Vec<String>,
    /// Canonical model identifier (`sonnet`, `opus`, `haiku`) or a passthrough value.
    pub model: Option<String>,
    pub metadata: Metadata,
    pub source_format: Option<String>,
}

/// Permission rule lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalPermission {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub ask: Vec<String>,
    pub default_mode: Option<String>,
    pub metadata: Metadata,
    pub source_format: Option<String>,
}

impl CanonicalPermission {
    /// Union-merges two rule sets.
    ///
    /// Every rule from either side survives, in first-seen order. A rule that
    /// lands in more than one list keeps only its most restrictive placement
    /// (deny, then ask, then allow). Scalar fields and metadata prefer `self`.
    /// Merging the result with either input again yields the same result.
    pub fn merge(&self, other: &Self) -> Self {
        let deny = union(&self.deny, &other.deny);
        let ask: Vec<String> = union(&self.ask, &other.ask)
            .into_iter()
            .filter(|rule| !deny.contains(rule))
            .collect();
        let allow: Vec<String> = union(&self.allow, &other.allow)
            .into_iter()
            .filter(|rule| !deny.contains(rule) && !ask.contains(rule))
            .collect();

        let mut metadata = self.metadata.clone();
        metadata.merge_missing(&other.metadata);

        Self {
            allow,
            deny,
            ask,
            default_mode: self
                .default_mode
                .clone()
                .or_else(|| other.default_mode.clone()),
            metadata,
            source_format: self.source_format.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty() && self.ask.is_empty()
    }
}

fn union(first: &[String], second: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(first.len() + second.len());
    for rule in first.iter().chain(second) {
        if !out.contains(rule) {
            out.push(rule.clone());
        }
    }
    out
}

/// A reusable prompt invoked by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalSlashCommand {
    pub name: String,
    pub description: String,
    /// Prompt body. Arguments are written as `$ARGUMENTS`.
    pub instructions: String,
    pub argument_hint: Option<String>,
    pub model: Option<String>,
    pub allowed_tools: Vec<String>,
    pub metadata: Metadata,
    pub source_format: Option<String>,
}

/// Any canonical record.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalConfig {
    Agent(CanonicalAgent),
    Permission(CanonicalPermission),
    SlashCommand(CanonicalSlashCommand),
}

impl CanonicalConfig {
    pub fn config_type(&self) -> ConfigType {
        match self {
            Self::Agent(_) => ConfigType::Agent,
            Self::Permission(_) => ConfigType::Permission,
            Self::SlashCommand(_) => ConfigType::SlashCommand,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Self::Agent(a) => &a.metadata,
            Self::Permission(p) => &p.metadata,
            Self::SlashCommand(c) => &c.metadata,
        }
    }

    pub fn source_format(&self) -> Option<&str> {
        match self {
            Self::Agent(a) => a.source_format.as_deref(),
            Self::Permission(p) => p.source_format.as_deref(),
            Self::SlashCommand(c) => c.source_format.as_deref(),
        }
    }

    /// Logical name; permissions have none.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Agent(a) => Some(&a.name),
            Self::SlashCommand(c) => Some(&c.name),
            Self::Permission(_) => None,
        }
    }

    /// Sets the name when the record has an empty one.
    pub fn fill_missing_name(&mut self, name: &str) {
        match self {
            Self::Agent(a) if a.name.trim().is_empty() => a.name = name.to_string(),
            Self::SlashCommand(c) if c.name.trim().is_empty() => c.name = name.to_string(),
            _ => {}
        }
    }

    pub fn as_permission(&self) -> Option<&CanonicalPermission> {
        match self {
            Self::Permission(p) => Some(p),
            _ => None,
        }
    }
}

impl From<CanonicalAgent> for CanonicalConfig {
    fn from(value: CanonicalAgent) -> Self {
        Self::Agent(value)
    }
}

impl From<CanonicalPermission> for CanonicalConfig {
    fn from(value: CanonicalPermission) -> Self {
        Self::Permission(value)
    }
}

impl From<CanonicalSlashCommand> for CanonicalConfig {
    fn from(value: CanonicalSlashCommand) -> Self {
        Self::SlashCommand(value)
    }
}
