//! YAML frontmatter handling shared by the Markdown-based formats.
//!
//! A document is an optional `---` delimited YAML mapping followed by a
//! Markdown body. Bodies are normalized (leading blank lines and trailing
//! whitespace removed) so that parse → render → parse is stable.

use crate::error::SyncError;
use crate::Result;
use serde_yaml::{Mapping, Value};

/// A parsed Markdown document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub frontmatter: Mapping,
    pub body: String,
    /// Whether the source had a frontmatter block at all.
    pub has_frontmatter: bool,
}

/// Split `content` into frontmatter and body.
///
/// Content without a leading `---` line is all body. An opening delimiter
/// without a closing one, or frontmatter that is not a mapping, is an error.
pub fn split(content: &str, format: &str) -> Result<Document> {
    let content = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");

    let Some(rest) = content.strip_prefix("---\n") else {
        return Ok(Document {
            body: normalize_body(&content),
            ..Document::default()
        });
    };

    let (yaml, body) = if let Some(body) = rest.strip_prefix("---\n") {
        ("", body)
    } else if let Some(end) = rest.find("\n---\n") {
        (&rest[..end], &rest[end + 5..])
    } else if let Some(yaml) = rest.strip_suffix("\n---") {
        (yaml, "")
    } else {
        return Err(SyncError::parse(format, "unterminated YAML frontmatter").into());
    };

    let frontmatter = match serde_yaml::from_str::<Value>(yaml)
        .map_err(|e| SyncError::parse(format, format!("invalid YAML frontmatter: {e}")))?
    {
        Value::Null => Mapping::new(),
        Value::Mapping(map) => map,
        _ => return Err(SyncError::parse(format, "frontmatter must be a YAML mapping").into()),
    };

    Ok(Document {
        frontmatter,
        body: normalize_body(body),
        has_frontmatter: true,
    })
}

/// Render frontmatter and body. An empty mapping renders the body alone.
pub fn render(frontmatter: &Mapping, body: &str) -> Result<String> {
    let body = normalize_body(body);
    if frontmatter.is_empty() {
        return Ok(format!("{body}\n"));
    }
    let yaml = serde_yaml::to_string(frontmatter)?;
    Ok(format!("---\n{yaml}---\n{body}\n"))
}

fn normalize_body(body: &str) -> String {
    body.trim_start_matches('\n').trim_end().to_string()
}

/// A scalar field as a string (numbers and booleans are stringified).
pub fn get_str(map: &Mapping, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A list field given either as a YAML sequence or a comma-separated string.
pub fn get_list(map: &Mapping, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => split_tool_list(s),
        _ => Vec::new(),
    }
}

/// Split a comma-separated tool list, ignoring commas inside parentheses.
///
/// `"Read, Bash(git add:*), Bash(ls, cat)"` yields three entries.
pub fn split_tool_list(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in raw.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                push_trimmed(&mut out, &current);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    push_trimmed(&mut out, &current);
    out
}

fn push_trimmed(out: &mut Vec<String>, item: &str) {
    let item = item.trim();
    if !item.is_empty() {
        out.push(item.to_string());
    }
}

pub fn insert_str(map: &mut Mapping, key: &str, value: impl Into<String>) {
    map.insert(Value::String(key.to_string()), Value::String(value.into()));
}

pub fn insert_list(map: &mut Mapping, key: &str, items: &[String]) {
    let seq = items.iter().cloned().map(Value::String).collect();
    map.insert(Value::String(key.to_string()), Value::Sequence(seq));
}

/// Converts a YAML value for storage in canonical metadata.
pub fn yaml_to_json(value: &Value) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

/// Converts a canonical metadata value back to YAML.
pub fn json_to_yaml(value: &serde_json::Value) -> Value {
    serde_yaml::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_frontmatter_and_body() {
        let doc = split("---\nname: planner\n---\n\nBody text\n\n", "claude").unwrap();
        assert!(doc.has_frontmatter);
        assert_eq!(get_str(&doc.frontmatter, "name").as_deref(), Some("planner"));
        assert_eq!(doc.body, "Body text");
    }

    #[test]
    fn content_without_frontmatter_is_body() {
        let doc = split("Just a prompt\n", "claude").unwrap();
        assert!(!doc.has_frontmatter);
        assert!(doc.frontmatter.is_empty());
        assert_eq!(doc.body, "Just a prompt");
    }

    #[test]
    fn handles_crlf_and_empty_frontmatter() {
        let doc = split("---\r\n---\r\nBody\r\n", "claude").unwrap();
        assert!(doc.has_frontmatter);
        assert!(doc.frontmatter.is_empty());
        assert_eq!(doc.body, "Body");
    }

    #[test]
    fn rejects_unterminated_frontmatter() {
        let err = split("---\nname: x\nBody", "copilot").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn rejects_non_mapping_frontmatter() {
        assert!(split("---\n- a\n- b\n---\nBody", "copilot").is_err());
    }

    #[test]
    fn lists_accept_sequences_and_comma_strings() {
        let doc = split(
            "---\na: Read, Grep\nb:\n  - search\n  - fetch\n---\n",
            "claude",
        )
        .unwrap();
        assert_eq!(get_list(&doc.frontmatter, "a"), vec!["Read", "Grep"]);
        assert_eq!(get_list(&doc.frontmatter, "b"), vec!["search", "fetch"]);
        assert!(get_list(&doc.frontmatter, "missing").is_empty());
    }

    #[test]
    fn tool_lists_keep_parenthesized_commas() {
        assert_eq!(
            split_tool_list("Read, Bash(git add:*), Bash(ls, cat)"),
            vec!["Read", "Bash(git add:*)", "Bash(ls, cat)"]
        );
    }

    #[test]
    fn render_round_trips() {
        let mut map = Mapping::new();
        insert_str(&mut map, "name", "planner");
        insert_list(&mut map, "tools", &["search".to_string()]);
        let text = render(&map, "\nBody\n").unwrap();

        assert!(text.starts_with("---\nname: planner\n"));
        let doc = split(&text, "copilot").unwrap();
        assert_eq!(doc.frontmatter, map);
        assert_eq!(doc.body, "Body");
    }

    #[test]
    fn render_without_frontmatter_is_body_only() {
        assert_eq!(render(&Mapping::new(), "Body").unwrap(), "Body\n");
    }
}
