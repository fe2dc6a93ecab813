use crate::cli::{parse_only, Cli};
use crate::resolver::CliResolver;
use anyhow::{anyhow, bail, Context, Result};
use hubsync_state::{env_assume_yes, resolve_state_file, SyncStateStore};
use hubsync_sync::{
    ConfigType, ConversionOptions, ConversionReport, FormatAdapter, FormatRegistry, SyncError,
    SyncOrchestrator, SyncParams, SyncPlan, SyncStats,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Handle directory sync. Returns whether every pair synced without error.
///
/// Every config type is planned before any is committed, so under
/// `--strict` a lossy type stops the whole run.
pub(crate) fn handle_sync_command(cli: &Cli) -> Result<bool> {
    let source_dir = required(&cli.source_dir, "--source-dir")?;
    let target_dir = required(&cli.target_dir, "--target-dir")?;
    let source_format = required(&cli.source_format, "--source-format")?;
    let target_format = required(&cli.target_format, "--target-format")?;

    let registry = FormatRegistry::with_builtin_adapters();
    let source = registry.require_adapter(source_format)?;
    let target = registry.require_adapter(target_format)?;

    let profile_mode = cli.only.is_some();
    let config_types = match &cli.only {
        Some(only) => {
            if cli.config_type.is_some() {
                eprintln!("Warning: --only takes precedence over --config-type");
            }
            parse_only(only)?
        }
        None => vec![cli.config_type.unwrap_or(ConfigType::Agent)],
    };
    for config_type in &config_types {
        for adapter in [&source, &target] {
            if !adapter.supports(*config_type) {
                return Err(SyncError::UnsupportedConfigType {
                    format: adapter.format_name().to_string(),
                    config_type: *config_type,
                }
                .into());
            }
        }
    }

    if !source_dir.is_dir() {
        bail!("Source directory does not exist: {}", source_dir.display());
    }
    if !cli.dry_run {
        fs::create_dir_all(target_dir)
            .with_context(|| format!("Failed to create target directory {}", target_dir.display()))?;
    }

    let state_path = resolve_state_file(cli.state_file.clone())?;
    tracing::debug!(path = %state_path.display(), "using sync state file");
    let mut state = SyncStateStore::open(state_path);
    let assume_yes = cli.yes || env_assume_yes();

    let mut plans = Vec::with_capacity(config_types.len());
    for config_type in config_types {
        let (from, to) = if profile_mode {
            (
                profile_dir(source_dir, source.as_ref(), config_type),
                profile_dir(target_dir, target.as_ref(), config_type),
            )
        } else {
            (source_dir.clone(), target_dir.clone())
        };

        let mut params = SyncParams::new(from, to, source_format, target_format, config_type);
        params.direction = cli.sync_direction();
        params.dry_run = cli.dry_run;
        params.force = cli.force;
        params.strict = cli.strict;
        params.conversion = ConversionOptions {
            add_argument_hint: cli.add_argument_hint,
            add_handoffs: cli.add_handoffs,
        };

        let mut orchestrator = SyncOrchestrator::new(&registry, params, state)?
            .with_resolver(CliResolver::new(assume_yes));
        let plan = orchestrator.plan()?;
        state = orchestrator.into_state();
        plans.push(plan);
    }

    if cli.strict {
        let warnings: Vec<_> = plans.iter().flat_map(SyncPlan::lossy_warnings).collect();
        if !warnings.is_empty() {
            return Err(SyncError::StrictModeViolation { warnings }.into());
        }
    }

    let mut totals = SyncStats::default();
    let mut conversion = ConversionReport::new();
    for plan in plans {
        let params = plan.params().clone();
        println!(
            "Syncing {}: {} ({source_format}) <-> {} ({target_format})",
            params.config_type,
            params.source_dir.display(),
            params.target_dir.display()
        );

        let mut orchestrator = SyncOrchestrator::new(&registry, params, state)?
            .with_logger(|line: &str| println!("{line}"));
        let report = orchestrator.commit(plan)?;
        state = orchestrator.into_state();

        for failure in &report.failures {
            eprintln!("Error: {}: {}", failure.base_name, failure.message);
        }
        add_stats(&mut totals, &report.stats);
        conversion.extend(report.conversion.warnings().iter().cloned());
    }

    if conversion.has_warnings() {
        println!("{}", conversion.generate_report(cli.verbose));
    }
    Ok(totals.errors == 0)
}

fn required<'a, T>(value: &'a Option<T>, flag: &str) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| anyhow!("{flag} is required for directory sync"))
}

fn profile_dir(root: &Path, adapter: &dyn FormatAdapter, config_type: ConfigType) -> PathBuf {
    match adapter.subdirectory(config_type) {
        Some(sub) => root.join(sub),
        None => root.to_path_buf(),
    }
}

fn add_stats(totals: &mut SyncStats, stats: &SyncStats) {
    totals.source_to_target += stats.source_to_target;
    totals.target_to_source += stats.target_to_source;
    totals.deletions += stats.deletions;
    totals.conflicts += stats.conflicts;
    totals.skipped += stats.skipped;
    totals.errors += stats.errors;
}
