//! Conversion warnings, the human-readable conversion report, and sync
//! statistics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a conversion warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    /// Notice only, e.g. a pattern rewritten into an equivalent form.
    Info,
    /// Semantics were lost in translation.
    Warning,
    Error,
}

impl WarningLevel {
    /// Whether this level blocks writes in strict mode.
    pub fn is_lossy(&self) -> bool {
        *self >= Self::Warning
    }
}

/// Structured detail attached to some warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WarningDetail {
    /// A rule moved to a weaker category, e.g. Claude deny to VS Code `false`.
    Lossy {
        rule: String,
        from: String,
        to: String,
        reason: String,
    },
    /// A pattern rewritten into the target's syntax.
    Pattern {
        original: String,
        transformed: String,
        kind: String,
    },
}

/// One non-fatal finding from a single conversion call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionWarning {
    pub level: WarningLevel,
    /// Machine-friendly category (`lossy_conversion`, `unsupported_field`, ...).
    pub category: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<WarningDetail>,
}

impl ConversionWarning {
    pub fn new(level: WarningLevel, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            category: category.into(),
            message: message.into(),
            detail: None,
        }
    }

    /// A lossy rule conversion, reported at `Warning` level.
    pub fn lossy(rule: &str, from: &str, to: &str, reason: &str) -> Self {
        let mut message = format!("Lossy conversion: '{rule}' from '{from}' to '{to}'");
        if !reason.is_empty() {
            message.push_str(&format!(" ({reason})"));
        }
        Self {
            level: WarningLevel::Warning,
            category: "lossy_conversion".into(),
            message,
            detail: Some(WarningDetail::Lossy {
                rule: rule.into(),
                from: from.into(),
                to: to.into(),
                reason: reason.into(),
            }),
        }
    }

    /// A pattern rewrite, reported at `Info` level.
    pub fn pattern(original: &str, transformed: &str, kind: &str) -> Self {
        let mut message = format!("Pattern '{original}' -> '{transformed}'");
        if !kind.is_empty() {
            message.push_str(&format!(" ({kind})"));
        }
        Self {
            level: WarningLevel::Info,
            category: "pattern_transformation".into(),
            message,
            detail: Some(WarningDetail::Pattern {
                original: original.into(),
                transformed: transformed.into(),
                kind: kind.into(),
            }),
        }
    }

    pub fn is_lossy(&self) -> bool {
        self.level.is_lossy()
    }
}

impl fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

const RULE: &str = "======================================================================";
const SUB_RULE: &str = "----------------------------------------------------------------------";

/// Warnings collected across a whole operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionReport {
    warnings: Vec<ConversionWarning>,
}

impl ConversionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, warning: ConversionWarning) {
        self.warnings.push(warning);
    }

    pub fn extend(&mut self, warnings: impl IntoIterator<Item = ConversionWarning>) {
        self.warnings.extend(warnings);
    }

    pub fn warnings(&self) -> &[ConversionWarning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.warnings.iter().any(|w| w.level == WarningLevel::Error)
    }

    /// Warnings that block strict mode.
    pub fn lossy_warnings(&self) -> Vec<ConversionWarning> {
        self.warnings.iter().filter(|w| w.is_lossy()).cloned().collect()
    }

    pub fn count(&self, level: WarningLevel) -> usize {
        self.warnings.iter().filter(|w| w.level == level).count()
    }

    pub fn clear(&mut self) {
        self.warnings.clear();
    }

    /// Renders the report; `INFO` entries appear only when `verbose`.
    pub fn generate_report(&self, verbose: bool) -> String {
        if !self.has_warnings() {
            return "Conversion completed successfully with no warnings.".to_string();
        }

        let errors = self.count(WarningLevel::Error);
        let warnings = self.count(WarningLevel::Warning);
        let infos = self.count(WarningLevel::Info);

        let mut lines = vec![
            RULE.to_string(),
            "CONVERSION REPORT".to_string(),
            RULE.to_string(),
            String::new(),
            format!("Summary: {errors} errors, {warnings} warnings, {infos} info"),
            String::new(),
        ];

        let sections = [
            (WarningLevel::Error, "ERRORS:", errors > 0),
            (WarningLevel::Warning, "WARNINGS:", warnings > 0),
            (WarningLevel::Info, "INFO:", verbose && infos > 0),
        ];
        for (level, title, show) in sections {
            if !show {
                continue;
            }
            lines.push(title.to_string());
            lines.push(SUB_RULE.to_string());
            lines.extend(
                self.warnings
                    .iter()
                    .filter(|w| w.level == level)
                    .map(|w| format!("  {w}")),
            );
            lines.push(String::new());
        }

        let lossy: Vec<_> = self
            .warnings
            .iter()
            .filter_map(|w| match &w.detail {
                Some(WarningDetail::Lossy {
                    rule,
                    from,
                    to,
                    reason,
                }) => Some((rule, from, to, reason)),
                _ => None,
            })
            .collect();
        if !lossy.is_empty() {
            lines.push("LOSSY CONVERSIONS:".to_string());
            lines.push(SUB_RULE.to_string());
            for (rule, from, to, reason) in lossy {
                lines.push(format!("  Rule: {rule}"));
                lines.push(format!("    {from} -> {to}"));
                if !reason.is_empty() {
                    lines.push(format!("    Reason: {reason}"));
                }
                lines.push(String::new());
            }
        }

        lines.push(RULE.to_string());
        lines.join("\n")
    }
}

/// Per-action counters for one sync operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub source_to_target: usize,
    pub target_to_source: usize,
    pub deletions: usize,
    pub conflicts: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl SyncStats {
    /// Number of files written or deleted.
    pub fn changes(&self) -> usize {
        self.source_to_target + self.target_to_source + self.deletions
    }
}

/// A file pair that failed during sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairFailure {
    pub base_name: String,
    pub message: String,
}

/// Outcome of a sync operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub stats: SyncStats,
    pub conversion: ConversionReport,
    pub failures: Vec<PairFailure>,
    pub dry_run: bool,
    /// Summary lines, as emitted through the logger.
    pub summary: Vec<String>,
}

impl SyncReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.stats.errors == 0
    }

    /// Builds the summary block for a `source -> target` run.
    pub fn format_summary(&self, source: &str, target: &str) -> Vec<String> {
        let s = &self.stats;
        let mut lines = vec![
            "Summary:".to_string(),
            format!("  {source} -> {target}: {}", s.source_to_target),
            format!("  {target} -> {source}: {}", s.target_to_source),
            format!("  Deletions:  {}", s.deletions),
            format!("  Conflicts:  {}", s.conflicts),
            format!("  Skipped:    {}", s.skipped),
            format!("  Errors:     {}", s.errors),
        ];
        if self.dry_run {
            lines.push("  (dry run - no changes were made)".to_string());
        }
        lines
    }
}
