//! Model name mapping between tool spellings and canonical short names.
//!
//! Canonical model identifiers are the Claude family short names
//! (`opus`, `sonnet`, `haiku`). VS Code's chat UI spells the same models as
//! display names (`Claude Sonnet 4`). Anything unrecognized passes through
//! untouched in both directions.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Claude model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaudeModel {
    Opus,
    Sonnet,
    Haiku,
}

impl ClaudeModel {
    /// Parse a canonical short name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opus" => Some(Self::Opus),
            "sonnet" => Some(Self::Sonnet),
            "haiku" => Some(Self::Haiku),
            _ => None,
        }
    }

    /// Get the canonical shorthand name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opus => "opus",
            Self::Sonnet => "sonnet",
            Self::Haiku => "haiku",
        }
    }

    /// Get the display name used by VS Code Copilot.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Opus => "Claude Opus 4",
            Self::Sonnet => "Claude Sonnet 4",
            Self::Haiku => "Claude Haiku 4",
        }
    }
}

/// Lowercased display name → model.
static DISPLAY_TO_MODEL: LazyLock<HashMap<&'static str, ClaudeModel>> = LazyLock::new(|| {
    HashMap::from([
        ("claude sonnet 4", ClaudeModel::Sonnet),
        ("claude opus 4", ClaudeModel::Opus),
        ("claude haiku 4", ClaudeModel::Haiku),
    ])
});

/// Maps a display name such as `Claude Sonnet 4` to its canonical short name.
///
/// Matching is exact apart from case and surrounding whitespace, so newer
/// spellings (e.g. `Claude Sonnet 4.5`) pass through unchanged rather than
/// collapsing onto an older model.
pub fn canonical_from_display(model: &str) -> String {
    let lower = model.trim().to_lowercase();
    DISPLAY_TO_MODEL
        .get(lower.as_str())
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| model.trim().to_string())
}

/// Maps a canonical short name to its display name; passthrough otherwise.
pub fn display_from_canonical(model: &str) -> String {
    ClaudeModel::parse(model)
        .map(|m| m.display_name().to_string())
        .unwrap_or_else(|| model.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_map_to_short_names() {
        assert_eq!(canonical_from_display("Claude Sonnet 4"), "sonnet");
        assert_eq!(canonical_from_display("claude opus 4"), "opus");
        assert_eq!(canonical_from_display(" Claude Haiku 4 "), "haiku");
    }

    #[test]
    fn short_names_map_to_display_names() {
        assert_eq!(display_from_canonical("sonnet"), "Claude Sonnet 4");
        assert_eq!(display_from_canonical("Opus"), "Claude Opus 4");
        assert_eq!(display_from_canonical("haiku"), "Claude Haiku 4");
    }

    #[test]
    fn unknown_models_pass_through() {
        assert_eq!(canonical_from_display("GPT-4o"), "GPT-4o");
        assert_eq!(canonical_from_display("Claude Sonnet 4.5"), "Claude Sonnet 4.5");
        assert_eq!(display_from_canonical("inherit"), "inherit");
    }

    #[test]
    fn mapping_round_trips() {
        for model in [ClaudeModel::Opus, ClaudeModel::Sonnet, ClaudeModel::Haiku] {
            let display = display_from_canonical(model.as_str());
            assert_eq!(canonical_from_display(&display), model.as_str());
        }
    }
}
