//! Conflict resolution for the command line.

use hubsync_sync::{ConflictResolver, FilePair, FileSide, SyncAction};
use inquire::Select;
use std::io::IsTerminal;

const USE_SOURCE: &str = "Keep source (overwrite target)";
const USE_TARGET: &str = "Keep target (overwrite source)";
const SKIP: &str = "Skip";

/// Asks on the terminal, or skips when prompting is not possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliResolver {
    Prompt,
    Skip,
}

impl CliResolver {
    /// Prompts only when allowed and stdin is a terminal.
    pub fn new(assume_yes: bool) -> Self {
        if !assume_yes && std::io::stdin().is_terminal() {
            Self::Prompt
        } else {
            Self::Skip
        }
    }
}

impl ConflictResolver for CliResolver {
    fn resolve(&mut self, pair: &FilePair) -> Option<SyncAction> {
        match self {
            Self::Skip => {
                tracing::info!(base_name = %pair.base_name, "conflict skipped");
                None
            }
            Self::Prompt => prompt(pair),
        }
    }
}

fn describe(side: &Option<FileSide>) -> String {
    match side {
        Some(side) => format!("{} (mtime {:.0})", side.path.display(), side.mtime),
        None => "missing".to_string(),
    }
}

fn prompt(pair: &FilePair) -> Option<SyncAction> {
    let message = format!("'{}' changed on both sides. Which version wins?", pair.base_name);
    let help = format!(
        "source: {} | target: {}",
        describe(&pair.source),
        describe(&pair.target)
    );
    match Select::new(&message, vec![USE_SOURCE, USE_TARGET, SKIP])
        .with_help_message(&help)
        .prompt()
    {
        Ok(USE_SOURCE) => Some(SyncAction::SourceToTarget),
        Ok(USE_TARGET) => Some(SyncAction::TargetToSource),
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(base_name = %pair.base_name, error = %err, "conflict prompt failed; skipping");
            None
        }
    }
}
