use anyhow::Result;
use std::path::PathBuf;

/// File name of the state file placed in the home directory by default.
pub const DEFAULT_STATE_FILE_NAME: &str = ".agent_sync_state.json";

/// Returns the user's home directory.
pub fn home_dir() -> Result<PathBuf> {
    #[cfg(unix)]
    if let Ok(home) = std::env::var("HOME") {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir().ok_or_else(|| anyhow::anyhow!("home directory not found"))
}

/// Returns the state file named by `HUBSYNC_STATE_FILE`, ignoring blank values.
pub fn state_file_from_env() -> Option<PathBuf> {
    std::env::var("HUBSYNC_STATE_FILE")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

/// Returns the state file used when none is given on the command line.
///
/// `HUBSYNC_STATE_FILE` wins; otherwise `~/.agent_sync_state.json`.
pub fn default_state_file() -> Result<PathBuf> {
    if let Some(path) = state_file_from_env() {
        return Ok(path);
    }
    Ok(home_dir()?.join(DEFAULT_STATE_FILE_NAME))
}

/// Resolves the state file, preferring an explicitly supplied path.
pub fn resolve_state_file(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => default_state_file(),
    }
}

/// Checks if `HUBSYNC_ASSUME_YES` environment variable is set to true.
pub fn env_assume_yes() -> bool {
    std::env::var("HUBSYNC_ASSUME_YES")
        .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
