//! Integration tests for two-file ("in place") sync.

use hubsync_state::SyncStateStore;
use hubsync_sync::{ConfigType, FormatRegistry, SyncError, SyncOrchestrator, SyncParams};
use hubsync_test_utils::{
    set_mtime, SyncFixture, CLAUDE_AGENT, CLAUDE_SETTINGS, CLAUDE_SETTINGS_ALLOW_ONLY,
    COPILOT_PERMISSIONS,
};
use serde_json::Value;
use std::fs;
use std::path::Path;

fn orchestrator(fixture: &SyncFixture, config_type: ConfigType, strict: bool) -> SyncOrchestrator {
    let mut params = SyncParams::new(
        &fixture.source_dir,
        &fixture.target_dir,
        "claude",
        "copilot",
        config_type,
    );
    params.strict = strict;
    let registry = FormatRegistry::with_builtin_adapters();
    SyncOrchestrator::new(&registry, params, SyncStateStore::open(&fixture.state_file))
        .unwrap()
        .with_logger(|_| {})
}

fn json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn strings(value: &Value) -> Vec<&str> {
    let mut items: Vec<&str> = value
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    items.sort_unstable();
    items
}

#[test]
fn test_bidirectional_permissions_merge_both_ways() {
    /*
    GIVEN Claude settings allowing "Bash(git:*)" and Copilot settings approving "ls"
    WHEN syncing the two files bidirectionally
    THEN both files end up with both rules
    AND a second run changes nothing
    */
    let fixture = SyncFixture::new().unwrap();
    let source = fixture.write_source("settings.json", CLAUDE_SETTINGS_ALLOW_ONLY).unwrap();
    let target = fixture.write_target("settings.perm.json", COPILOT_PERMISSIONS).unwrap();

    let report = orchestrator(&fixture, ConfigType::Permission, false)
        .sync_files_in_place(&source, &target, true, false)
        .unwrap();
    assert_eq!(report.stats.changes(), 2);

    let claude = json(&source);
    assert_eq!(
        strings(&claude["permissions"]["allow"]),
        vec!["Bash(git:*)", "Bash(ls:*)"]
    );
    let copilot = json(&target);
    assert_eq!(copilot["chat.tools.terminal.autoApprove"]["git"], Value::Bool(true));
    assert_eq!(copilot["chat.tools.terminal.autoApprove"]["ls"], Value::Bool(true));

    let (before_source, before_target) = (
        fs::read_to_string(&source).unwrap(),
        fs::read_to_string(&target).unwrap(),
    );
    let again = orchestrator(&fixture, ConfigType::Permission, false)
        .sync_files_in_place(&source, &target, true, false)
        .unwrap();
    assert_eq!(again.stats.changes(), 0);
    assert_eq!(fs::read_to_string(&source).unwrap(), before_source);
    assert_eq!(fs::read_to_string(&target).unwrap(), before_target);
}

#[test]
fn test_strict_bidirectional_leaves_both_files_untouched() {
    /*
    GIVEN Claude settings with a deny rule and existing Copilot settings
    WHEN syncing bidirectionally with --strict
    THEN the call fails with a strict-mode violation
    AND both files are byte-identical to their previous contents
    */
    let fixture = SyncFixture::new().unwrap();
    let source = fixture.write_source("settings.json", CLAUDE_SETTINGS).unwrap();
    let target = fixture.write_target("settings.perm.json", COPILOT_PERMISSIONS).unwrap();

    let err = orchestrator(&fixture, ConfigType::Permission, true)
        .sync_files_in_place(&source, &target, true, false)
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::StrictModeViolation { .. })
    ));
    assert_eq!(fs::read_to_string(&source).unwrap(), CLAUDE_SETTINGS);
    assert_eq!(fs::read_to_string(&target).unwrap(), COPILOT_PERMISSIONS);
    assert!(!fixture.state_file.exists());
}

#[test]
fn test_unidirectional_creates_target() {
    /*
    GIVEN a Claude agent and no Copilot file yet
    WHEN syncing the pair one way
    THEN the Copilot file is created and the state remembers the pair
    */
    let fixture = SyncFixture::new().unwrap();
    let source = fixture.write_source("planner.md", CLAUDE_AGENT).unwrap();
    let target = fixture.target_dir.join("planner.agent.md");

    let mut orch = orchestrator(&fixture, ConfigType::Agent, false);
    let report = orch.sync_files_in_place(&source, &target, false, false).unwrap();

    assert_eq!(report.stats.source_to_target, 1);
    assert!(fs::read_to_string(&target).unwrap().contains("name: planner"));
    assert!(orch
        .state()
        .get_file_state(&source, &target, "planner.md")
        .is_some());
}

#[test]
fn test_bidirectional_agent_takes_newer_file() {
    /*
    GIVEN a Claude agent and a newer Copilot version of it
    WHEN syncing the pair bidirectionally
    THEN the Claude file is rewritten from the Copilot one
    */
    let fixture = SyncFixture::new().unwrap();
    let source = fixture.write_source("planner.md", CLAUDE_AGENT).unwrap();
    let target = fixture
        .write_target(
            "planner.agent.md",
            "---\nname: planner\ndescription: Newer plan\n---\nUpdated in VS Code.\n",
        )
        .unwrap();
    set_mtime(&source, 1_000_000_000).unwrap();
    set_mtime(&target, 2_000_000_000).unwrap();

    let report = orchestrator(&fixture, ConfigType::Agent, false)
        .sync_files_in_place(&source, &target, true, false)
        .unwrap();

    assert_eq!(report.stats.target_to_source, 1);
    assert!(fs::read_to_string(&source).unwrap().contains("Updated in VS Code."));
}

#[test]
fn test_dry_run_writes_nothing() {
    /*
    GIVEN a Claude agent and no Copilot file
    WHEN syncing the pair as a dry run
    THEN the report counts the write but no file or state appears
    */
    let fixture = SyncFixture::new().unwrap();
    let source = fixture.write_source("planner.md", CLAUDE_AGENT).unwrap();
    let target = fixture.target_dir.join("planner.agent.md");

    let report = orchestrator(&fixture, ConfigType::Agent, false)
        .sync_files_in_place(&source, &target, false, true)
        .unwrap();

    assert_eq!(report.stats.source_to_target, 1);
    assert!(report.dry_run);
    assert!(!target.exists());
    assert!(!fixture.state_file.exists());
}

fn forced(fixture: &SyncFixture) -> SyncOrchestrator {
    let mut params = SyncParams::new(
        &fixture.source_dir,
        &fixture.target_dir,
        "claude",
        "copilot",
        ConfigType::Agent,
    );
    params.force = true;
    let registry = FormatRegistry::with_builtin_adapters();
    SyncOrchestrator::new(&registry, params, SyncStateStore::open(&fixture.state_file))
        .unwrap()
        .with_logger(|_| {})
}

/// A synced agent pair whose record matches the files: Claude newer than Copilot.
fn synced_pair(fixture: &SyncFixture) -> (std::path::PathBuf, std::path::PathBuf) {
    let source = fixture.write_source("planner.md", CLAUDE_AGENT).unwrap();
    let target = fixture.target_dir.join("planner.agent.md");
    orchestrator(fixture, ConfigType::Agent, false)
        .sync_files_in_place(&source, &target, true, false)
        .unwrap();
    set_mtime(&source, 1_500_000_000).unwrap();
    set_mtime(&target, 1_100_000_000).unwrap();
    let mut state = SyncStateStore::open(&fixture.state_file);
    state.update_file_state(
        &source,
        &target,
        "planner.md",
        Some(1_500_000_000.0),
        Some(1_100_000_000.0),
        "source_to_target",
    );
    state.save().unwrap();
    (source, target)
}

fn copilot_planner(body: &str) -> String {
    format!("---\nname: planner\ndescription: Plans work\n---\n{body}\n")
}

#[test]
fn test_bidirectional_change_on_one_side_wins_over_newer_mtime() {
    /*
    GIVEN a recorded in-place pair
    AND only the Copilot file edited since, with an mtime older than the Claude file
    WHEN syncing the pair bidirectionally
    THEN the Copilot edit flows to the Claude file
    */
    let fixture = SyncFixture::new().unwrap();
    let (source, target) = synced_pair(&fixture);
    fs::write(&target, copilot_planner("Edited in VS Code.")).unwrap();
    set_mtime(&target, 1_200_000_000).unwrap();

    let report = orchestrator(&fixture, ConfigType::Agent, false)
        .sync_files_in_place(&source, &target, true, false)
        .unwrap();

    assert_eq!((report.stats.target_to_source, report.stats.conflicts), (1, 0));
    assert!(fs::read_to_string(&source).unwrap().contains("Edited in VS Code."));
}

#[test]
fn test_bidirectional_edits_on_both_sides_are_a_conflict() {
    /*
    GIVEN a recorded in-place pair
    AND both files edited since
    WHEN syncing bidirectionally without --force
    THEN the conflict is counted and neither file is written
    WHEN syncing again with --force
    THEN the newer Copilot file wins
    */
    let fixture = SyncFixture::new().unwrap();
    let (source, target) = synced_pair(&fixture);
    fs::write(&source, CLAUDE_AGENT.replace("planning agent", "Claude edit agent")).unwrap();
    fs::write(&target, copilot_planner("Copilot edit.")).unwrap();
    set_mtime(&source, 1_600_000_000).unwrap();
    set_mtime(&target, 1_700_000_000).unwrap();
    let claude_before = fs::read_to_string(&source).unwrap();

    let report = orchestrator(&fixture, ConfigType::Agent, false)
        .sync_files_in_place(&source, &target, true, false)
        .unwrap();

    assert_eq!(report.stats.conflicts, 1);
    assert_eq!(report.stats.changes(), 0);
    assert_eq!(fs::read_to_string(&source).unwrap(), claude_before);
    assert!(fs::read_to_string(&target).unwrap().contains("Copilot edit."));

    let report = forced(&fixture)
        .sync_files_in_place(&source, &target, true, false)
        .unwrap();

    assert_eq!((report.stats.conflicts, report.stats.target_to_source), (1, 1));
    assert!(fs::read_to_string(&source).unwrap().contains("Copilot edit."));
}
