use anyhow::{bail, Result};
use clap::Parser;
use hubsync_sync::{ConfigType, SyncDirection};
use std::path::PathBuf;

/// Command-line interface for `hubsync`.
///
/// Runs in one of two modes: directory sync (`--source-dir` / `--target-dir`)
/// or single-file conversion (`--convert-file`).
#[derive(Debug, Parser)]
#[command(
    name = "hubsync",
    version,
    about = "Convert and sync agents, slash commands and permissions between AI coding tools"
)]
pub struct Cli {
    /// Directory holding the source files (or the source profile root with --only).
    #[arg(long, value_name = "DIR", conflicts_with = "convert_file")]
    pub source_dir: Option<PathBuf>,

    /// Directory holding the target files (or the target profile root with --only).
    #[arg(long, value_name = "DIR", conflicts_with = "convert_file")]
    pub target_dir: Option<PathBuf>,

    /// Source format (claude, copilot, gemini). Detected from the input file in convert mode.
    #[arg(long, value_name = "FORMAT")]
    pub source_format: Option<String>,

    /// Target format. Detected from --output in convert mode.
    #[arg(long, value_name = "FORMAT")]
    pub target_format: Option<String>,

    /// Config type: agent, permission or slash-command (default: agent).
    #[arg(long, value_name = "TYPE")]
    pub config_type: Option<ConfigType>,

    /// Sync direction: source-to-target, target-to-source or both (default: both).
    #[arg(long, value_name = "DIRECTION", conflicts_with = "bidirectional")]
    pub direction: Option<SyncDirection>,

    /// Shorthand for --direction both; with --convert-file, merge into an existing --output.
    #[arg(long)]
    pub bidirectional: bool,

    /// Show what would change without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Resolve conflicts by taking the newer file, without prompting.
    #[arg(long)]
    pub force: bool,

    /// Fail without writing anything if a conversion would lose information.
    #[arg(long)]
    pub strict: bool,

    /// Debug logging and full error details.
    #[arg(short, long)]
    pub verbose: bool,

    /// Sync state file (default: $HUBSYNC_STATE_FILE, then ~/.agent_sync_state.json).
    #[arg(long, value_name = "PATH")]
    pub state_file: Option<PathBuf>,

    /// Sync several config types at once, e.g. "agents,commands,permissions".
    /// The directories are then treated as profile roots.
    #[arg(long, value_name = "TYPES", conflicts_with = "convert_file")]
    pub only: Option<String>,

    /// Never prompt; conflicts that --force does not settle are skipped.
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Add an argument-hint to Copilot agents that have none.
    #[arg(long)]
    pub add_argument_hint: bool,

    /// Add a default handoff to Copilot agents that have none.
    #[arg(long)]
    pub add_handoffs: bool,

    /// Convert a single file instead of syncing directories.
    #[arg(long, value_name = "FILE")]
    pub convert_file: Option<PathBuf>,

    /// Output path for --convert-file.
    #[arg(long, value_name = "FILE", requires = "convert_file")]
    pub output: Option<PathBuf>,
}

impl Cli {
    pub fn sync_direction(&self) -> SyncDirection {
        if self.bidirectional {
            SyncDirection::Both
        } else {
            self.direction.unwrap_or_default()
        }
    }
}

/// Parses an `--only` list.
///
/// Entries are comma-separated and accept singular or plural spellings
/// (`agent`, `agents`, `command`, `slash-commands`, `permissions`, ...).
/// Duplicates collapse; order of first appearance is kept.
pub fn parse_only(raw: &str) -> Result<Vec<ConfigType>> {
    let mut types = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim().to_ascii_lowercase().replace('_', "-");
        let config_type = match entry.as_str() {
            "" => bail!("--only contains an empty entry: '{raw}'"),
            "agent" | "agents" => ConfigType::Agent,
            "permission" | "permissions" => ConfigType::Permission,
            "command" | "commands" | "slash-command" | "slash-commands" => ConfigType::SlashCommand,
            other => bail!(
                "Unknown config type '{other}' in --only (expected agents, commands or permissions)"
            ),
        };
        if !types.contains(&config_type) {
            types.push(config_type);
        }
    }
    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_only_accepts_aliases() {
        assert_eq!(
            parse_only("agents, slash-command,permission").unwrap(),
            vec![ConfigType::Agent, ConfigType::SlashCommand, ConfigType::Permission]
        );
        assert_eq!(
            parse_only("commands,Commands,slash_commands").unwrap(),
            vec![ConfigType::SlashCommand]
        );
    }

    #[test]
    fn parse_only_rejects_empty_and_unknown() {
        assert!(parse_only("").is_err());
        assert!(parse_only("agents,,commands").is_err());
        let err = parse_only("agents,skills").unwrap_err();
        assert!(err.to_string().contains("'skills'"));
    }

    #[test]
    fn parses_sync_arguments() {
        let cli = Cli::try_parse_from([
            "hubsync",
            "--source-dir",
            "a",
            "--target-dir",
            "b",
            "--source-format",
            "claude",
            "--target-format",
            "copilot",
            "--config-type",
            "slash-command",
            "--direction",
            "source-to-target",
            "--strict",
        ])
        .unwrap();

        assert_eq!(cli.config_type, Some(ConfigType::SlashCommand));
        assert_eq!(cli.sync_direction(), SyncDirection::SourceToTarget);
        assert!(cli.strict);
    }

    #[test]
    fn bidirectional_means_both() {
        let cli = Cli::try_parse_from(["hubsync", "--bidirectional"]).unwrap();
        assert_eq!(cli.sync_direction(), SyncDirection::Both);
    }

    #[test]
    fn conflicting_options_are_rejected() {
        assert!(Cli::try_parse_from([
            "hubsync",
            "--convert-file",
            "a.md",
            "--source-dir",
            "x"
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "hubsync",
            "--bidirectional",
            "--direction",
            "both"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["hubsync", "--output", "x.md"]).is_err());
    }

    #[test]
    fn invalid_config_type_is_rejected() {
        assert!(Cli::try_parse_from(["hubsync", "--config-type", "skill"]).is_err());
    }
}
