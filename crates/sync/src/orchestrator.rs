//! Sync orchestrator that pairs files across two directories and keeps them
//! in step.
//!
//! A run has two phases. Planning discovers file pairs, classifies each one
//! against the state store, resolves conflicts and renders every write in
//! memory, collecting conversion warnings. Committing writes files, updates
//! the state store and saves it. Strict mode sits between the two: if any
//! planned conversion is lossy the run fails before the first write.

use crate::adapters::utils::{file_name, hash_content, is_hidden_component};
use crate::adapters::{ConversionOptions, FormatAdapter};
use crate::canonical::{CanonicalConfig, ConfigType};
use crate::convert::{read, render};
use crate::error::SyncError;
use crate::registry::FormatRegistry;
use crate::report::{ConversionWarning, PairFailure, SyncReport};
use crate::Result;
use anyhow::{bail, Context};
use hubsync_state::{FileState, SyncStateStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

/// Mtimes closer than this are considered equal.
const MTIME_TOLERANCE: f64 = 1e-6;

/// Which way changes may flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    /// Only write to the target directory.
    SourceToTarget,
    /// Only write to the source directory.
    TargetToSource,
    #[default]
    Both,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceToTarget => "source-to-target",
            Self::TargetToSource => "target-to-source",
            Self::Both => "both",
        }
    }

    /// Whether `action` is permitted in this direction.
    pub fn allows(&self, action: SyncAction) -> bool {
        match self {
            Self::Both => true,
            Self::SourceToTarget => !action.writes_source(),
            Self::TargetToSource => !action.writes_target(),
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_direction(s)
    }
}

/// Parses a direction name.
///
/// ```
/// use hubsync_sync::{parse_direction, SyncDirection};
///
/// assert_eq!(parse_direction("both").unwrap(), SyncDirection::Both);
/// assert_eq!(
///     parse_direction("Source-To-Target").unwrap(),
///     SyncDirection::SourceToTarget
/// );
/// assert!(parse_direction("sideways").is_err());
/// ```
pub fn parse_direction(s: &str) -> Result<SyncDirection> {
    match s.to_lowercase().replace('_', "-").as_str() {
        "source-to-target" => Ok(SyncDirection::SourceToTarget),
        "target-to-source" => Ok(SyncDirection::TargetToSource),
        "both" => Ok(SyncDirection::Both),
        other => bail!(
            "Invalid direction '{other}'. Use 'source-to-target', 'target-to-source' or 'both'."
        ),
    }
}

/// What happens to one file pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    SourceToTarget,
    TargetToSource,
    Skip,
    Conflict,
    DeleteTarget,
    DeleteSource,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceToTarget => "source_to_target",
            Self::TargetToSource => "target_to_source",
            Self::Skip => "skip",
            Self::Conflict => "conflict",
            Self::DeleteTarget => "delete_target",
            Self::DeleteSource => "delete_source",
        }
    }

    fn writes_target(&self) -> bool {
        matches!(self, Self::SourceToTarget | Self::DeleteTarget)
    }

    fn writes_source(&self) -> bool {
        matches!(self, Self::TargetToSource | Self::DeleteSource)
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a file pair as observed on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSide {
    pub path: PathBuf,
    /// Modification time in seconds since the Unix epoch.
    pub mtime: f64,
}

impl FileSide {
    /// Stats `path`.
    pub fn observe(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mtime = mtime_of(&path)?;
        Ok(Self { path, mtime })
    }
}

/// A logical file present on at least one side.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePair {
    pub base_name: String,
    pub source: Option<FileSide>,
    pub target: Option<FileSide>,
}

impl FilePair {
    /// Fails when both sides are absent.
    pub fn new(
        base_name: impl Into<String>,
        source: Option<FileSide>,
        target: Option<FileSide>,
    ) -> Result<Self> {
        let base_name = base_name.into();
        if source.is_none() && target.is_none() {
            return Err(SyncError::InvalidFilePair { base_name }.into());
        }
        Ok(Self {
            base_name,
            source,
            target,
        })
    }
}

/// Decides conflicts that the orchestrator cannot settle on its own.
///
/// Returning `None`, or any verdict other than
/// [`SyncAction::SourceToTarget`] / [`SyncAction::TargetToSource`], skips the
/// pair.
pub trait ConflictResolver {
    fn resolve(&mut self, pair: &FilePair) -> Option<SyncAction>;
}

impl<F> ConflictResolver for F
where
    F: FnMut(&FilePair) -> Option<SyncAction>,
{
    fn resolve(&mut self, pair: &FilePair) -> Option<SyncAction> {
        self(pair)
    }
}

/// Leaves every conflict alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipConflicts;

impl ConflictResolver for SkipConflicts {
    fn resolve(&mut self, _pair: &FilePair) -> Option<SyncAction> {
        None
    }
}

/// Copies the side with the newer mtime; equal mtimes favour the source.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewestWins;

impl ConflictResolver for NewestWins {
    fn resolve(&mut self, pair: &FilePair) -> Option<SyncAction> {
        match (&pair.source, &pair.target) {
            (Some(s), Some(t)) if t.mtime > s.mtime + MTIME_TOLERANCE => {
                Some(SyncAction::TargetToSource)
            }
            (Some(_), _) => Some(SyncAction::SourceToTarget),
            (None, Some(_)) => Some(SyncAction::TargetToSource),
            (None, None) => None,
        }
    }
}

/// Parameters for a directory sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncParams {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub source_format: String,
    pub target_format: String,
    pub config_type: ConfigType,
    #[serde(default)]
    pub direction: SyncDirection,
    /// Plan and report without touching files or state.
    #[serde(default)]
    pub dry_run: bool,
    /// Resolve conflicts with [`NewestWins`] instead of asking.
    #[serde(default)]
    pub force: bool,
    /// Fail without writing if any conversion is lossy.
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub conversion: ConversionOptions,
}

impl SyncParams {
    /// Bidirectional, non-forced, non-strict parameters.
    ///
    /// ```
    /// use hubsync_sync::{ConfigType, SyncDirection, SyncParams};
    ///
    /// let params = SyncParams::new("a", "b", "claude", "copilot", ConfigType::Agent);
    /// assert_eq!(params.direction, SyncDirection::Both);
    /// assert!(!params.dry_run);
    /// ```
    pub fn new(
        source_dir: impl Into<PathBuf>,
        target_dir: impl Into<PathBuf>,
        source_format: impl Into<String>,
        target_format: impl Into<String>,
        config_type: ConfigType,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
            source_format: source_format.into(),
            target_format: target_format.into(),
            config_type,
            direction: SyncDirection::Both,
            dry_run: false,
            force: false,
            strict: false,
            conversion: ConversionOptions::default(),
        }
    }
}

/// A write rendered during planning.
#[derive(Debug)]
struct PendingWrite {
    path: PathBuf,
    content: String,
    /// File whose mtime the written file takes over.
    donor: PathBuf,
}

#[derive(Debug)]
struct PlannedStep {
    pair: FilePair,
    action: SyncAction,
    write: Option<PendingWrite>,
}

/// Everything a directory sync would do, rendered but not yet written.
///
/// Produced by [`SyncOrchestrator::plan`] and consumed by
/// [`SyncOrchestrator::commit`]. Several plans can be checked together
/// before any of them is committed.
#[derive(Debug)]
pub struct SyncPlan {
    params: SyncParams,
    steps: Vec<PlannedStep>,
    stale: Vec<String>,
    report: SyncReport,
}

impl SyncPlan {
    /// Parameters the plan was made with.
    pub fn params(&self) -> &SyncParams {
        &self.params
    }

    /// Counters, warnings and failures gathered while planning.
    pub fn report(&self) -> &SyncReport {
        &self.report
    }

    /// Warnings that would fail strict mode.
    pub fn lossy_warnings(&self) -> Vec<ConversionWarning> {
        self.report.conversion.lossy_warnings()
    }

    /// Number of pairs with a planned action, including skips.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Coordinates two adapters, the state store and conflict resolution.
pub struct SyncOrchestrator {
    source: Arc<dyn FormatAdapter>,
    target: Arc<dyn FormatAdapter>,
    params: SyncParams,
    state: SyncStateStore,
    resolver: Box<dyn ConflictResolver>,
    logger: Box<dyn FnMut(&str)>,
}

impl fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("source", &self.source.format_name())
            .field("target", &self.target.format_name())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Resolves both formats and checks they support the config type.
    ///
    /// No filesystem access happens here.
    pub fn new(registry: &FormatRegistry, params: SyncParams, state: SyncStateStore) -> Result<Self> {
        let source = registry.require_adapter(&params.source_format)?;
        let target = registry.require_adapter(&params.target_format)?;
        for adapter in [&source, &target] {
            if !adapter.supports(params.config_type) {
                return Err(SyncError::UnsupportedConfigType {
                    format: adapter.format_name().to_string(),
                    config_type: params.config_type,
                }
                .into());
            }
        }

        Ok(Self {
            source,
            target,
            params,
            state,
            resolver: Box::new(SkipConflicts),
            logger: Box::new(|line: &str| tracing::info!("{line}")),
        })
    }

    /// Conflict port used when `force` is off.
    pub fn with_resolver(mut self, resolver: impl ConflictResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Receives the summary lines at the end of a run.
    pub fn with_logger(mut self, logger: impl FnMut(&str) + 'static) -> Self {
        self.logger = Box::new(logger);
        self
    }

    pub fn params(&self) -> &SyncParams {
        &self.params
    }

    pub fn state(&self) -> &SyncStateStore {
        &self.state
    }

    pub fn into_state(self) -> SyncStateStore {
        self.state
    }

    /// Runs a directory sync: [`plan`](Self::plan), then [`commit`](Self::commit).
    ///
    /// Per-pair failures are counted in the report and do not stop the run.
    /// Under strict mode a lossy conversion anywhere fails the whole run with
    /// [`SyncError::StrictModeViolation`] before anything is written, dry run
    /// or not.
    pub fn sync(&mut self) -> Result<SyncReport> {
        let plan = self.plan()?;
        self.commit(plan)
    }

    /// Discovers pairs, classifies them, resolves conflicts and renders every
    /// write in memory. Touches neither files nor the state file.
    pub fn plan(&mut self) -> Result<SyncPlan> {
        let mut report = SyncReport::new(self.params.dry_run);

        let pairs = self.discover_file_pairs()?;
        let discovered: BTreeSet<&str> = pairs.iter().map(|p| p.base_name.as_str()).collect();
        let stale: Vec<String> = self
            .state
            .tracked_files(&self.params.source_dir, &self.params.target_dir)
            .into_iter()
            .filter(|name| !discovered.contains(name.as_str()))
            .collect();

        let mut steps = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let mut action = self.determine_action(&pair);
            if action == SyncAction::Conflict {
                report.stats.conflicts += 1;
                action = self.resolve_conflict(&pair);
            }
            tracing::debug!(base_name = %pair.base_name, action = %action, "planned");

            let mut warnings = Vec::new();
            match self.prepare_write(&pair, action, &mut warnings) {
                Ok(write) => steps.push(PlannedStep { pair, action, write }),
                Err(err) => record_failure(&mut report, &pair.base_name, &err),
            }
            report.conversion.extend(warnings);
        }

        Ok(SyncPlan {
            params: self.params.clone(),
            steps,
            stale,
            report,
        })
    }

    /// Applies a plan made by an orchestrator with the same parameters.
    ///
    /// Under strict mode the plan's warnings are checked first and nothing is
    /// written if any is lossy. The state file is saved unless dry run.
    pub fn commit(&mut self, plan: SyncPlan) -> Result<SyncReport> {
        let SyncPlan {
            params,
            steps,
            stale,
            mut report,
        } = plan;
        if params != self.params {
            bail!(
                "plan for {} -> {} does not match this orchestrator",
                params.source_dir.display(),
                params.target_dir.display()
            );
        }
        if self.params.strict {
            enforce_strict(&report.conversion.lossy_warnings())?;
        }

        for step in steps {
            let base_name = step.pair.base_name.clone();
            if let Err(err) = self.commit_step(step, &mut report) {
                record_failure(&mut report, &base_name, &err);
            }
        }

        if !self.params.dry_run {
            for base_name in &stale {
                self.state.remove_file_state(
                    &self.params.source_dir,
                    &self.params.target_dir,
                    base_name,
                );
            }
            self.state.save()?;
        }

        report.summary =
            report.format_summary(self.source.format_name(), self.target.format_name());
        for line in &report.summary {
            (self.logger)(line);
        }
        Ok(report)
    }

    /// Syncs exactly two files, outside of directory discovery.
    ///
    /// One-way mode converts the source onto the target. Bidirectional mode
    /// reads both: permission records are merged and written back to both
    /// files. Other records are classified against the state recorded for the
    /// two paths, like a directory pair: the changed side wins, and a change on
    /// both sides is a conflict for [`NewestWins`] (under force) or the
    /// resolver. Without a record the newer file wins. An unresolved conflict
    /// writes nothing and leaves the record alone.
    ///
    /// Files are only written when their content changes. Under strict mode
    /// every warning from every conversion is checked before either file is
    /// touched.
    pub fn sync_files_in_place(
        &mut self,
        source_path: &Path,
        target_path: &Path,
        bidirectional: bool,
        dry_run: bool,
    ) -> Result<SyncReport> {
        let config_type = self.params.config_type;
        let options = self.params.conversion;
        let mut report = SyncReport::new(dry_run);
        let mut warnings = Vec::new();

        let source_side = FileSide::observe(source_path)?;
        let target_side = if target_path.exists() {
            Some(FileSide::observe(target_path)?)
        } else {
            None
        };

        let source = read(self.source.as_ref(), source_path, config_type, &mut warnings)?;
        let mut writes: Vec<(SyncAction, PathBuf, String)> = Vec::new();
        let mut unresolved = false;

        match (&target_side, bidirectional) {
            (Some(target_side), true) => {
                let target = read(self.target.as_ref(), target_path, config_type, &mut warnings)?;
                if let (Some(s), Some(t)) = (source.as_permission(), target.as_permission()) {
                    let merged = CanonicalConfig::Permission(s.merge(t));
                    let to_target =
                        render(self.target.as_ref(), &merged, config_type, &options, &mut warnings)?;
                    let to_source =
                        render(self.source.as_ref(), &merged, config_type, &options, &mut warnings)?;
                    writes.push((SyncAction::SourceToTarget, target_path.to_path_buf(), to_target));
                    writes.push((SyncAction::TargetToSource, source_path.to_path_buf(), to_source));
                } else {
                    let pair = FilePair::new(
                        file_name(source_path),
                        Some(source_side.clone()),
                        Some(target_side.clone()),
                    )?;
                    let recorded =
                        self.state
                            .get_file_state(source_path, target_path, &pair.base_name);
                    let mut action = match recorded {
                        Some(_) => classify(&pair, recorded),
                        None => NewestWins
                            .resolve(&pair)
                            .unwrap_or(SyncAction::SourceToTarget),
                    };
                    if action == SyncAction::Conflict {
                        report.stats.conflicts += 1;
                        action = self.conflict_verdict(&pair);
                        unresolved = action == SyncAction::Skip;
                    }
                    match action {
                        SyncAction::TargetToSource => {
                            let content = render(
                                self.source.as_ref(),
                                &target,
                                config_type,
                                &options,
                                &mut warnings,
                            )?;
                            writes.push((action, source_path.to_path_buf(), content));
                        }
                        SyncAction::SourceToTarget => {
                            let content = render(
                                self.target.as_ref(),
                                &source,
                                config_type,
                                &options,
                                &mut warnings,
                            )?;
                            writes.push((action, target_path.to_path_buf(), content));
                        }
                        _ => {}
                    }
                }
            }
            _ => {
                let content =
                    render(self.target.as_ref(), &source, config_type, &options, &mut warnings)?;
                writes.push((SyncAction::SourceToTarget, target_path.to_path_buf(), content));
            }
        }

        report.conversion.extend(warnings);
        if self.params.strict {
            enforce_strict(&report.conversion.lossy_warnings())?;
        }

        let mut last_action = SyncAction::Skip;
        for (action, path, content) in writes {
            if unchanged_on_disk(&path, &content) {
                continue;
            }
            tracing::debug!(path = %path.display(), action = %action, dry_run, "in-place write");
            if !dry_run {
                write_file(&path, &content)?;
            }
            match action {
                SyncAction::TargetToSource => report.stats.target_to_source += 1,
                _ => report.stats.source_to_target += 1,
            }
            last_action = action;
        }
        if report.stats.changes() == 0 {
            report.stats.skipped += 1;
        }

        if !dry_run && !unresolved {
            let base_name = file_name(source_path).to_string();
            self.state.update_file_state(
                source_path,
                target_path,
                &base_name,
                mtime_of(source_path).ok(),
                mtime_of(target_path).ok(),
                last_action.as_str(),
            );
            self.state.save()?;
        }

        report.summary =
            report.format_summary(self.source.format_name(), self.target.format_name());
        for line in &report.summary {
            (self.logger)(line);
        }
        Ok(report)
    }

    /// Pairs files from both directories by base name, sorted by base name.
    fn discover_file_pairs(&self) -> Result<Vec<FilePair>> {
        let config_type = self.params.config_type;
        let sources = scan_directory(self.source.as_ref(), &self.params.source_dir, config_type)?;
        let mut targets =
            scan_directory(self.target.as_ref(), &self.params.target_dir, config_type)?;

        let mut pairs = Vec::with_capacity(sources.len().max(targets.len()));
        for (base_name, source) in sources {
            let target = targets.remove(&base_name);
            pairs.push(FilePair::new(base_name, Some(source), target)?);
        }
        for (base_name, target) in targets {
            pairs.push(FilePair::new(base_name, None, Some(target))?);
        }
        pairs.sort_by(|a, b| a.base_name.cmp(&b.base_name));
        tracing::debug!(pairs = pairs.len(), "discovered file pairs");
        Ok(pairs)
    }

    /// Classifies a pair against its recorded state, then applies the
    /// direction filter.
    fn determine_action(&self, pair: &FilePair) -> SyncAction {
        let state = self.state.get_file_state(
            &self.params.source_dir,
            &self.params.target_dir,
            &pair.base_name,
        );
        self.filter_direction(classify(pair, state))
    }

    fn filter_direction(&self, action: SyncAction) -> SyncAction {
        if self.params.direction.allows(action) {
            action
        } else {
            SyncAction::Skip
        }
    }

    fn resolve_conflict(&mut self, pair: &FilePair) -> SyncAction {
        let action = self.conflict_verdict(pair);
        self.filter_direction(action)
    }

    /// `NewestWins` under force, the resolver otherwise; anything but a copy is a skip.
    fn conflict_verdict(&mut self, pair: &FilePair) -> SyncAction {
        let verdict = if self.params.force {
            NewestWins.resolve(pair)
        } else {
            self.resolver.resolve(pair)
        };
        match verdict {
            Some(action @ (SyncAction::SourceToTarget | SyncAction::TargetToSource)) => action,
            _ => SyncAction::Skip,
        }
    }

    /// Renders the content a copy action would write.
    fn prepare_write(
        &self,
        pair: &FilePair,
        action: SyncAction,
        warnings: &mut Vec<ConversionWarning>,
    ) -> Result<Option<PendingWrite>> {
        let (donor, from, to, existing, dir) = match action {
            SyncAction::SourceToTarget => (
                &pair.source,
                &self.source,
                &self.target,
                &pair.target,
                &self.params.target_dir,
            ),
            SyncAction::TargetToSource => (
                &pair.target,
                &self.target,
                &self.source,
                &pair.source,
                &self.params.source_dir,
            ),
            _ => return Ok(None),
        };
        let Some(donor) = donor else {
            bail!("'{}' has no file to copy from", pair.base_name);
        };

        let config_type = self.params.config_type;
        let canonical = read(from.as_ref(), &donor.path, config_type, warnings)?;
        let content = render(
            to.as_ref(),
            &canonical,
            config_type,
            &self.params.conversion,
            warnings,
        )?;
        let path = match existing {
            Some(side) => side.path.clone(),
            None => target_path_for(to.as_ref(), dir, &pair.base_name, config_type)?,
        };
        Ok(Some(PendingWrite {
            path,
            content,
            donor: donor.path.clone(),
        }))
    }

    fn commit_step(&mut self, step: PlannedStep, report: &mut SyncReport) -> Result<()> {
        let PlannedStep { pair, action, write } = step;
        let dry_run = self.params.dry_run;
        let (source_dir, target_dir) = (&self.params.source_dir, &self.params.target_dir);

        match action {
            SyncAction::SourceToTarget | SyncAction::TargetToSource => {
                let Some(write) = write else {
                    bail!("no content prepared for '{}'", pair.base_name);
                };
                if !dry_run {
                    write_file(&write.path, &write.content)?;
                    copy_mtime(&write.donor, &write.path)?;
                    let (source_path, target_path) = if action == SyncAction::SourceToTarget {
                        (&write.donor, &write.path)
                    } else {
                        (&write.path, &write.donor)
                    };
                    self.state.update_file_state(
                        source_dir,
                        target_dir,
                        &pair.base_name,
                        Some(mtime_of(source_path)?),
                        Some(mtime_of(target_path)?),
                        action.as_str(),
                    );
                }
                if action == SyncAction::SourceToTarget {
                    report.stats.source_to_target += 1;
                } else {
                    report.stats.target_to_source += 1;
                }
            }
            SyncAction::DeleteTarget | SyncAction::DeleteSource => {
                let side = if action == SyncAction::DeleteTarget {
                    &pair.target
                } else {
                    &pair.source
                };
                if let (Some(side), false) = (side, dry_run) {
                    fs::remove_file(&side.path)
                        .with_context(|| format!("Failed to delete {}", side.path.display()))?;
                    self.state
                        .remove_file_state(source_dir, target_dir, &pair.base_name);
                }
                report.stats.deletions += 1;
            }
            SyncAction::Skip | SyncAction::Conflict => {
                if let (Some(s), Some(t), false) = (&pair.source, &pair.target, dry_run) {
                    let untracked = self
                        .state
                        .get_file_state(source_dir, target_dir, &pair.base_name)
                        .is_none();
                    if untracked && same_mtime(s.mtime, t.mtime) {
                        self.state.update_file_state(
                            source_dir,
                            target_dir,
                            &pair.base_name,
                            Some(s.mtime),
                            Some(t.mtime),
                            SyncAction::Skip.as_str(),
                        );
                    }
                }
                report.stats.skipped += 1;
            }
        }
        tracing::debug!(base_name = %pair.base_name, action = %action, dry_run, "committed");
        Ok(())
    }
}

/// Action for a pair given what was recorded at its last sync.
///
/// A pair present on both sides with no record is a conflict unless both
/// files carry the same mtime, which is what a completed sync leaves behind.
fn classify(pair: &FilePair, state: Option<&FileState>) -> SyncAction {
    let changed = |recorded: Option<f64>, side: &FileSide| {
        !matches!(recorded, Some(r) if same_mtime(side.mtime, r))
    };

    match (&pair.source, &pair.target, state) {
        (Some(s), None, Some(st)) if st.target_mtime.is_some() && !changed(st.source_mtime, s) => {
            SyncAction::DeleteSource
        }
        (Some(_), None, _) => SyncAction::SourceToTarget,
        (None, Some(t), Some(st)) if st.source_mtime.is_some() && !changed(st.target_mtime, t) => {
            SyncAction::DeleteTarget
        }
        (None, Some(_), _) => SyncAction::TargetToSource,
        (Some(s), Some(t), None) if same_mtime(s.mtime, t.mtime) => SyncAction::Skip,
        (Some(_), Some(_), None) => SyncAction::Conflict,
        (Some(s), Some(t), Some(st)) => {
            match (changed(st.source_mtime, s), changed(st.target_mtime, t)) {
                (false, false) => SyncAction::Skip,
                (true, false) => SyncAction::SourceToTarget,
                (false, true) => SyncAction::TargetToSource,
                (true, true) => SyncAction::Conflict,
            }
        }
        (None, None, _) => SyncAction::Skip,
    }
}

fn same_mtime(a: f64, b: f64) -> bool {
    (a - b).abs() <= MTIME_TOLERANCE
}

fn record_failure(report: &mut SyncReport, base_name: &str, err: &anyhow::Error) {
    tracing::warn!(base_name = %base_name, error = %format!("{err:#}"), "sync failed for pair");
    report.stats.errors += 1;
    report.failures.push(PairFailure {
        base_name: base_name.to_string(),
        message: format!("{err:#}"),
    });
}

fn enforce_strict(lossy: &[ConversionWarning]) -> Result<()> {
    if lossy.is_empty() {
        return Ok(());
    }
    Err(SyncError::StrictModeViolation {
        warnings: lossy.to_vec(),
    }
    .into())
}

/// Files of `config_type` below `dir`, keyed by base name.
///
/// Base names are relative paths without the format suffix, joined with `/`.
/// Hidden entries are skipped, as are subdirectories the adapter reserves for
/// other config types. A missing directory has no files.
fn scan_directory(
    adapter: &dyn FormatAdapter,
    dir: &Path,
    config_type: ConfigType,
) -> Result<BTreeMap<String, FileSide>> {
    let mut files = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    let Some(extension) = adapter.file_extension(config_type) else {
        return Ok(files);
    };
    let own = adapter.subdirectory(config_type);
    let reserved: Vec<String> = ConfigType::ALL
        .into_iter()
        .filter(|ct| *ct != config_type)
        .filter_map(|ct| adapter.subdirectory(ct))
        .filter(|sub| Some(sub) != own.as_ref())
        .collect();

    let walker = WalkDir::new(dir).sort_by_file_name().into_iter().filter_entry(|e| {
        let name = e.file_name().to_string_lossy();
        e.depth() == 0
            || !(is_hidden_component(&name)
                || (e.file_type().is_dir() && reserved.iter().any(|r| *r == name)))
    });
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to scan {}", dir.display()))?;
        if !entry.file_type().is_file() || !adapter.can_handle(entry.path()) {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let relative = relative
            .iter()
            .map(|c| c.to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let Some(base_name) = relative.strip_suffix(extension.as_str()) else {
            continue;
        };
        if base_name.is_empty() || base_name.ends_with('/') {
            continue;
        }
        files.insert(base_name.to_string(), FileSide::observe(entry.path())?);
    }
    Ok(files)
}

fn target_path_for(
    adapter: &dyn FormatAdapter,
    dir: &Path,
    base_name: &str,
    config_type: ConfigType,
) -> Result<PathBuf> {
    let Some(extension) = adapter.file_extension(config_type) else {
        return Err(SyncError::UnsupportedConfigType {
            format: adapter.format_name().to_string(),
            config_type,
        }
        .into());
    };
    let mut path = dir.to_path_buf();
    for segment in base_name.split('/') {
        path.push(segment);
    }
    let name = format!("{}{extension}", file_name(&path));
    path.set_file_name(name);
    Ok(path)
}

fn mtime_of(path: &Path) -> Result<f64> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    Ok(seconds_since_epoch(modified))
}

fn seconds_since_epoch(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Gives `path` the exact modification time of `donor`.
fn copy_mtime(donor: &Path, path: &Path) -> Result<()> {
    let modified = fs::metadata(donor)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to stat {}", donor.display()))?;
    fs::File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(modified))
        .with_context(|| format!("Failed to set mtime on {}", path.display()))
}

fn unchanged_on_disk(path: &Path, content: &str) -> bool {
    fs::read(path).is_ok_and(|existing| hash_content(&existing) == hash_content(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ClaudeAdapter, CopilotAdapter, MockFormatAdapter};
    use hubsync_test_utils::{claude_agent, set_mtime, SyncFixture, CLAUDE_AGENT};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn registry() -> FormatRegistry {
        FormatRegistry::with_builtin_adapters()
    }

    fn orchestrator(fixture: &SyncFixture, params: SyncParams) -> SyncOrchestrator {
        let state = SyncStateStore::open(&fixture.state_file);
        SyncOrchestrator::new(&registry(), params, state).unwrap()
    }

    fn agent_params(fixture: &SyncFixture) -> SyncParams {
        SyncParams::new(
            &fixture.source_dir,
            &fixture.target_dir,
            "claude",
            "copilot",
            ConfigType::Agent,
        )
    }

    #[test]
    fn direction_parsing_and_display() {
        assert_eq!("target-to-source".parse::<SyncDirection>().unwrap(), SyncDirection::TargetToSource);
        assert_eq!(parse_direction("source_to_target").unwrap(), SyncDirection::SourceToTarget);
        assert_eq!(SyncDirection::Both.to_string(), "both");
    }

    #[test]
    fn direction_filters_actions() {
        let one_way = SyncDirection::SourceToTarget;
        assert!(one_way.allows(SyncAction::SourceToTarget));
        assert!(one_way.allows(SyncAction::DeleteTarget));
        assert!(!one_way.allows(SyncAction::TargetToSource));
        assert!(!one_way.allows(SyncAction::DeleteSource));
        assert!(!SyncDirection::TargetToSource.allows(SyncAction::SourceToTarget));
        assert!(SyncDirection::Both.allows(SyncAction::DeleteSource));
    }

    #[test]
    fn file_pair_requires_a_side() {
        let err = FilePair::new("ghost", None, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::InvalidFilePair { .. })
        ));
    }

    #[test]
    fn newest_wins_prefers_source_on_tie() {
        let side = |mtime| {
            Some(FileSide {
                path: PathBuf::from("x"),
                mtime,
            })
        };
        let tie = FilePair::new("x", side(10.0), side(10.0)).unwrap();
        let newer_target = FilePair::new("x", side(10.0), side(20.0)).unwrap();

        assert_eq!(NewestWins.resolve(&tie), Some(SyncAction::SourceToTarget));
        assert_eq!(NewestWins.resolve(&newer_target), Some(SyncAction::TargetToSource));
    }

    #[test]
    fn construction_rejects_unknown_format() {
        let fixture = SyncFixture::new().unwrap();
        let mut params = agent_params(&fixture);
        params.target_format = "cursor".into();

        let err = SyncOrchestrator::new(&registry(), params, SyncStateStore::open(&fixture.state_file))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::UnknownFormat { name, .. }) if name == "cursor"
        ));
    }

    #[test]
    fn construction_rejects_unsupported_config_type() {
        let fixture = SyncFixture::new().unwrap();
        let mut params = agent_params(&fixture);
        params.target_format = "gemini".into();

        let err = SyncOrchestrator::new(&registry(), params, SyncStateStore::open(&fixture.state_file))
            .unwrap_err();
        assert!(err.to_string().contains("'gemini' does not support config type 'agent'"));
    }

    #[test]
    fn new_source_file_is_copied_and_recorded() {
        let fixture = SyncFixture::new().unwrap();
        fixture.write_source("planner.md", CLAUDE_AGENT).unwrap();

        let mut orch = orchestrator(&fixture, agent_params(&fixture));
        let report = orch.sync().unwrap();

        assert_eq!(report.stats.source_to_target, 1);
        assert_eq!(report.stats.changes(), 1);
        let written = fixture.target_dir.join("planner.agent.md");
        assert!(fixture.read_target("planner.agent.md").unwrap().contains("name: planner"));

        let state = orch
            .state()
            .get_file_state(&fixture.source_dir, &fixture.target_dir, "planner")
            .unwrap();
        let on_disk = mtime_of(&written).unwrap();
        assert_eq!(state.target_mtime, Some(on_disk));
        assert_eq!(state.source_mtime, Some(on_disk));
        assert_eq!(state.last_action, "source_to_target");
        assert!(fixture.state_file.exists());
    }

    #[test]
    fn second_run_skips_everything() {
        let fixture = SyncFixture::new().unwrap();
        fixture.write_source("planner.md", CLAUDE_AGENT).unwrap();
        fixture.write_target("reviewer.agent.md", hubsync_test_utils::COPILOT_AGENT).unwrap();

        orchestrator(&fixture, agent_params(&fixture)).sync().unwrap();
        let report = orchestrator(&fixture, agent_params(&fixture)).sync().unwrap();

        assert_eq!(report.stats.changes(), 0);
        assert_eq!(report.stats.skipped, 2);
        assert!(fixture.source_dir.join("reviewer.md").exists());
    }

    #[test]
    fn changed_source_propagates() {
        let fixture = SyncFixture::new().unwrap();
        let source = fixture.write_source("planner.md", CLAUDE_AGENT).unwrap();
        orchestrator(&fixture, agent_params(&fixture)).sync().unwrap();

        fs::write(&source, claude_agent("planner", "Plans better", "New body")).unwrap();
        set_mtime(&source, 4_000_000_000).unwrap();
        let report = orchestrator(&fixture, agent_params(&fixture)).sync().unwrap();

        assert_eq!(report.stats.source_to_target, 1);
        assert!(fixture.read_target("planner.agent.md").unwrap().contains("New body"));
    }

    #[test]
    fn deletion_propagates_to_other_side() {
        let fixture = SyncFixture::new().unwrap();
        let source = fixture.write_source("planner.md", CLAUDE_AGENT).unwrap();
        orchestrator(&fixture, agent_params(&fixture)).sync().unwrap();

        fs::remove_file(&source).unwrap();
        let mut orch = orchestrator(&fixture, agent_params(&fixture));
        let report = orch.sync().unwrap();

        assert_eq!(report.stats.deletions, 1);
        assert!(!fixture.target_dir.join("planner.agent.md").exists());
        assert!(orch
            .state()
            .get_file_state(&fixture.source_dir, &fixture.target_dir, "planner")
            .is_none());
    }

    #[test]
    fn one_way_sync_does_not_write_source() {
        let fixture = SyncFixture::new().unwrap();
        fixture.write_target("reviewer.agent.md", hubsync_test_utils::COPILOT_AGENT).unwrap();
        let mut params = agent_params(&fixture);
        params.direction = SyncDirection::SourceToTarget;

        let report = orchestrator(&fixture, params).sync().unwrap();

        assert_eq!(report.stats.skipped, 1);
        assert!(!fixture.source_dir.join("reviewer.md").exists());
    }

    #[test]
    fn conflict_is_counted_once_and_resolved_by_callback() {
        let fixture = SyncFixture::new().unwrap();
        let source = fixture.write_source("planner.md", CLAUDE_AGENT).unwrap();
        let target = fixture.write_target(
            "planner.agent.md",
            "---\nname: planner\ndescription: Edited in VS Code\n---\nTarget body\n",
        ).unwrap();
        set_mtime(&source, 1_000_000_000).unwrap();
        set_mtime(&target, 1_000_000_050).unwrap();

        let asked = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&asked);
        let mut orch = orchestrator(&fixture, agent_params(&fixture)).with_resolver(
            move |pair: &FilePair| {
                seen.borrow_mut().push(pair.base_name.clone());
                Some(SyncAction::TargetToSource)
            },
        );
        let report = orch.sync().unwrap();

        assert_eq!(report.stats.conflicts, 1);
        assert_eq!(report.stats.target_to_source, 1);
        assert_eq!(*asked.borrow(), vec!["planner".to_string()]);
        assert!(fixture.read_source("planner.md").unwrap().contains("Target body"));
    }

    #[test]
    fn unresolved_conflict_is_skipped_and_stays_a_conflict() {
        let fixture = SyncFixture::new().unwrap();
        let source = fixture.write_source("planner.md", CLAUDE_AGENT).unwrap();
        let target = fixture
            .write_target("planner.agent.md", hubsync_test_utils::COPILOT_AGENT)
            .unwrap();
        set_mtime(&source, 1_000_000_000).unwrap();
        set_mtime(&target, 1_000_000_050).unwrap();

        let first = orchestrator(&fixture, agent_params(&fixture)).sync().unwrap();
        let second = orchestrator(&fixture, agent_params(&fixture)).sync().unwrap();

        assert_eq!((first.stats.conflicts, first.stats.skipped), (1, 1));
        assert_eq!(second.stats.conflicts, 1);
    }

    #[test]
    fn untracked_pair_with_equal_mtimes_is_skipped() {
        let side = |path: &str, mtime| {
            Some(FileSide {
                path: PathBuf::from(path),
                mtime,
            })
        };
        let same = FilePair::new("x", side("x.md", 5.0), side("x.agent.md", 5.0)).unwrap();
        let differ = FilePair::new("x", side("x.md", 5.0), side("x.agent.md", 6.0)).unwrap();

        assert_eq!(classify(&same, None), SyncAction::Skip);
        assert_eq!(classify(&differ, None), SyncAction::Conflict);
    }

    #[test]
    fn plan_from_other_params_is_rejected() {
        let fixture = SyncFixture::new().unwrap();
        fixture.write_source("planner.md", CLAUDE_AGENT).unwrap();
        let plan = orchestrator(&fixture, agent_params(&fixture)).plan().unwrap();

        let mut other = agent_params(&fixture);
        other.dry_run = true;
        let err = orchestrator(&fixture, other).commit(plan).unwrap_err();

        assert!(err.to_string().contains("does not match"));
        assert!(!fixture.target_dir.join("planner.agent.md").exists());
    }

    #[test]
    fn force_resolves_conflict_towards_newer_side() {
        let fixture = SyncFixture::new().unwrap();
        let source = fixture.write_source("planner.md", CLAUDE_AGENT).unwrap();
        let target = fixture.write_target(
            "planner.agent.md",
            "---\nname: planner\ndescription: Newer\n---\nNewer body\n",
        ).unwrap();
        set_mtime(&source, 1_000_000_000).unwrap();
        set_mtime(&target, 2_000_000_000).unwrap();
        let mut params = agent_params(&fixture);
        params.force = true;

        let report = orchestrator(&fixture, params).sync().unwrap();

        assert_eq!(report.stats.conflicts, 1);
        assert_eq!(report.stats.target_to_source, 1);
        assert!(fixture.read_source("planner.md").unwrap().contains("Newer body"));
    }

    #[test]
    fn dry_run_writes_nothing() {
        let fixture = SyncFixture::new().unwrap();
        fixture.write_source("planner.md", CLAUDE_AGENT).unwrap();
        let mut params = agent_params(&fixture);
        params.dry_run = true;

        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&lines);
        let report = orchestrator(&fixture, params)
            .with_logger(move |line: &str| sink.borrow_mut().push(line.to_string()))
            .sync()
            .unwrap();

        assert_eq!(report.stats.source_to_target, 1);
        assert!(!fixture.target_dir.join("planner.agent.md").exists());
        assert!(!fixture.state_file.exists());
        assert!(lines.borrow().iter().any(|l| l.contains("dry run")));
    }

    #[test]
    fn bad_file_is_counted_and_others_continue() {
        let fixture = SyncFixture::new().unwrap();
        fixture.write_source("broken.md", "---\nname: [unclosed\n---\nbody\n").unwrap();
        fixture.write_source("planner.md", CLAUDE_AGENT).unwrap();

        let report = orchestrator(&fixture, agent_params(&fixture)).sync().unwrap();

        assert_eq!(report.stats.errors, 1);
        assert_eq!(report.stats.source_to_target, 1);
        assert_eq!(report.failures[0].base_name, "broken");
        assert!(!report.success());
    }

    #[test]
    fn read_failure_from_adapter_is_recorded() {
        let fixture = SyncFixture::new().unwrap();
        fixture.write_source("planner.md", CLAUDE_AGENT).unwrap();

        let mut failing = MockFormatAdapter::new();
        failing.expect_format_name().return_const("failing".to_string());
        failing.expect_capability().returning(|_| crate::adapters::Capability::Supported);
        failing.expect_supports().returning(|_| true);
        failing
            .expect_file_extension()
            .returning(|_| Some(".md".to_string()));
        failing.expect_subdirectory().returning(|_| None);
        failing.expect_can_handle().returning(|_| true);
        failing
            .expect_read()
            .returning(|_, _| Err(anyhow::anyhow!("disk on fire")));
        failing.expect_take_warnings().returning(Vec::new);

        let mut registry = registry();
        registry.register(Arc::new(failing)).unwrap();
        let mut params = agent_params(&fixture);
        params.source_format = "failing".into();

        let mut orch =
            SyncOrchestrator::new(&registry, params, SyncStateStore::open(&fixture.state_file))
                .unwrap();
        let report = orch.sync().unwrap();

        assert_eq!(report.stats.errors, 1);
        assert!(report.failures[0].message.contains("disk on fire"));
        assert!(!fixture.target_dir.join("planner.agent.md").exists());
    }

    #[test]
    fn nested_files_keep_relative_base_names() {
        let fixture = SyncFixture::new().unwrap();
        fixture.write_source("git/commit.md", "Commit with message $ARGUMENTS\n").unwrap();
        let params = SyncParams::new(
            &fixture.source_dir,
            &fixture.target_dir,
            "claude",
            "gemini",
            ConfigType::SlashCommand,
        );

        let mut orch = orchestrator(&fixture, params);
        orch.sync().unwrap();

        assert!(fixture.read_target("git/commit.toml").unwrap().contains("{{args}}"));
        assert!(orch
            .state()
            .get_file_state(&fixture.source_dir, &fixture.target_dir, "git/commit")
            .is_some());
    }

    #[test]
    fn scan_skips_hidden_and_reserved_directories() {
        let tmp = tempfile::tempdir().unwrap();
        for rel in ["settings.json", ".cache/x.json", "agents/notes.json"] {
            let path = tmp.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "{}").unwrap();
        }

        let files = scan_directory(&ClaudeAdapter::new(), tmp.path(), ConfigType::Permission).unwrap();
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["settings"]);

        let missing = scan_directory(&CopilotAdapter::new(), &tmp.path().join("none"), ConfigType::Agent)
            .unwrap();
        assert!(missing.is_empty());
    }
}
