//! Shared test utilities for hubsync crates.
//!
//! Provides environment guards and a [`SyncFixture`] with a source and a
//! target directory plus a private state file, along with sample configs in
//! each supported tool format.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Serialize tests that mutate process-global state (env vars, cwd, etc).
///
/// Acquire this guard at the start of any test that modifies environment
/// variables to prevent race conditions between parallel tests.
pub fn env_guard() -> MutexGuard<'static, ()> {
    static TEST_SERIAL: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));
    TEST_SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

/// RAII guard for environment variables - restores original value on drop.
pub struct EnvVarGuard {
    key: &'static str,
    previous: Option<String>,
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(v) => std::env::set_var(self.key, v),
            None => std::env::remove_var(self.key),
        }
    }
}

/// Set an environment variable and return a guard that restores the original on drop.
///
/// # Example
/// ```
/// let _guard = hubsync_test_utils::set_env_var("HUBSYNC_DOC_VAR", Some("value"));
/// assert_eq!(std::env::var("HUBSYNC_DOC_VAR").unwrap(), "value");
/// ```
pub fn set_env_var(key: &'static str, value: Option<&str>) -> EnvVarGuard {
    let previous = std::env::var(key).ok();
    match value {
        Some(val) => std::env::set_var(key, val),
        None => std::env::remove_var(key),
    }
    EnvVarGuard { key, previous }
}

/// Claude agent with a comma-separated tool list.
pub const CLAUDE_AGENT: &str = "---
name: planner
description: Plans implementation work
tools: Read, Grep, Glob
model: sonnet
---
You are a planning agent.

Break the task into small steps.
";

/// Copilot agent with the VS Code model spelling.
pub const COPILOT_AGENT: &str = "---
name: reviewer
description: Reviews pull requests
tools:
- search
- fetch
model: Claude Sonnet 4
target: vscode
---
You review code carefully.
";

/// Claude settings with allow, ask and deny rules.
pub const CLAUDE_SETTINGS: &str = r#"{
  "permissions": {
    "allow": ["Bash(git:*)", "Bash(npm:*)"],
    "ask": ["Bash(docker:*)"],
    "deny": ["Bash(rm:*)"]
  }
}
"#;

/// Claude settings without any rule that is lossy for Copilot.
pub const CLAUDE_SETTINGS_ALLOW_ONLY: &str = r#"{
  "permissions": {
    "allow": ["Bash(git:*)"]
  }
}
"#;

/// Copilot terminal auto-approve settings.
pub const COPILOT_PERMISSIONS: &str = r#"{
  "chat.tools.terminal.autoApprove": {
    "ls": true
  }
}
"#;

/// Gemini slash command using an argument and a shell placeholder.
pub const GEMINI_COMMAND: &str = r#"description = "Review staged changes"
prompt = """
Review the following changes for {{args}}:

!{git diff --staged}
"""
"#;

/// Render a Claude agent file.
pub fn claude_agent(name: &str, description: &str, body: &str) -> String {
    format!("---\nname: {name}\ndescription: {description}\ntools: Read, Grep\nmodel: sonnet\n---\n{body}\n")
}

/// Render a Copilot agent file.
pub fn copilot_agent(name: &str, description: &str, body: &str) -> String {
    format!(
        "---\nname: {name}\ndescription: {description}\ntools:\n- search\nmodel: Claude Sonnet 4\ntarget: vscode\n---\n{body}\n"
    )
}

/// Source and target directories plus a private state file, under one tempdir.
///
/// The tempdir is removed when the fixture is dropped.
pub struct SyncFixture {
    pub tempdir: tempfile::TempDir,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub state_file: PathBuf,
}

impl SyncFixture {
    /// Create `source/` and `target/`; the state file is not created.
    pub fn new() -> std::io::Result<Self> {
        let tempdir = tempfile::tempdir()?;
        let source_dir = tempdir.path().join("source");
        let target_dir = tempdir.path().join("target");
        fs::create_dir_all(&source_dir)?;
        fs::create_dir_all(&target_dir)?;
        let state_file = tempdir.path().join("state.json");

        Ok(Self {
            tempdir,
            source_dir,
            target_dir,
            state_file,
        })
    }

    /// Root of the fixture, usable as HOME.
    pub fn root(&self) -> &Path {
        self.tempdir.path()
    }

    /// Write a file below the source directory, creating parents.
    pub fn write_source(&self, relative: &str, content: &str) -> std::io::Result<PathBuf> {
        write_file(&self.source_dir.join(relative), content)
    }

    /// Write a file below the target directory, creating parents.
    pub fn write_target(&self, relative: &str, content: &str) -> std::io::Result<PathBuf> {
        write_file(&self.target_dir.join(relative), content)
    }

    pub fn read_source(&self, relative: &str) -> std::io::Result<String> {
        fs::read_to_string(self.source_dir.join(relative))
    }

    pub fn read_target(&self, relative: &str) -> std::io::Result<String> {
        fs::read_to_string(self.target_dir.join(relative))
    }
}

fn write_file(path: &Path, content: &str) -> std::io::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(path.to_path_buf())
}

/// Set a file's modification time to `secs` seconds after the Unix epoch.
pub fn set_mtime(path: &Path, secs: u64) -> std::io::Result<()> {
    let file = fs::File::options().write(true).open(path)?;
    file.set_modified(UNIX_EPOCH + Duration::from_secs(secs))
}

/// Read a file's modification time as fractional seconds since the Unix epoch.
pub fn mtime_secs(path: &Path) -> std::io::Result<f64> {
    let modified: SystemTime = fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default())
}
