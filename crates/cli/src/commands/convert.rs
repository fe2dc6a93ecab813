use crate::cli::Cli;
use anyhow::{anyhow, bail, Context, Result};
use hubsync_state::{resolve_state_file, SyncStateStore};
use hubsync_sync::{
    convert_file, ConfigType, ConversionOptions, ConversionReport, FormatAdapter, FormatRegistry,
    SyncError, SyncOrchestrator, SyncParams,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Handle `--convert-file`. Returns whether the conversion completed.
pub(crate) fn handle_convert_command(cli: &Cli) -> Result<bool> {
    let input = cli
        .convert_file
        .as_deref()
        .ok_or_else(|| anyhow!("--convert-file is required"))?;
    if !input.is_file() {
        bail!("Input file does not exist: {}", input.display());
    }

    let registry = FormatRegistry::with_builtin_adapters();
    let source = match &cli.source_format {
        Some(name) => registry.require_adapter(name)?,
        None => registry.detect_format(input).ok_or_else(|| {
            anyhow!(
                "Could not detect the format of {}; pass --source-format",
                input.display()
            )
        })?,
    };
    let config_type = match cli.config_type {
        Some(config_type) => config_type,
        None => registry
            .detect_config_type(input, source.format_name())
            .ok_or_else(|| {
                anyhow!(
                    "Could not detect the config type of {}; pass --config-type",
                    input.display()
                )
            })?,
    };
    let target = resolve_target(&registry, cli)?;

    let output = match &cli.output {
        Some(path) => path.clone(),
        None => default_output(input, source.as_ref(), target.as_ref(), config_type)?,
    };
    if output == input {
        bail!("Output path is the same as the input: {}", output.display());
    }
    tracing::debug!(
        input = %input.display(),
        output = %output.display(),
        from = source.format_name(),
        to = target.format_name(),
        %config_type,
        "converting file"
    );

    if cli.bidirectional && output.exists() {
        return merge_in_place(cli, &registry, input, &output, &source, &target, config_type);
    }

    let options = ConversionOptions {
        add_argument_hint: cli.add_argument_hint,
        add_handoffs: cli.add_handoffs,
    };
    let conversion = convert_file(source.as_ref(), target.as_ref(), input, config_type, &options)?;
    if cli.strict && conversion.is_lossy() {
        let warnings = conversion
            .warnings
            .iter()
            .filter(|w| w.is_lossy())
            .cloned()
            .collect();
        return Err(SyncError::StrictModeViolation { warnings }.into());
    }

    if cli.dry_run {
        println!(
            "[dry run] Would convert {} -> {}",
            input.display(),
            output.display()
        );
    } else {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&output, &conversion.content)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!("Converted {} -> {}", input.display(), output.display());
    }

    if !conversion.warnings.is_empty() {
        let mut report = ConversionReport::new();
        report.extend(conversion.warnings);
        println!("{}", report.generate_report(cli.verbose));
    }
    Ok(true)
}

fn resolve_target(registry: &FormatRegistry, cli: &Cli) -> Result<Arc<dyn FormatAdapter>> {
    if let Some(name) = &cli.target_format {
        return registry.require_adapter(name);
    }
    cli.output
        .as_deref()
        .and_then(|output| registry.detect_format(output))
        .ok_or_else(|| anyhow!("--target-format is required unless --output names a recognizable file"))
}

/// `<input dir>/<base name><target extension>`.
fn default_output(
    input: &Path,
    source: &dyn FormatAdapter,
    target: &dyn FormatAdapter,
    config_type: ConfigType,
) -> Result<PathBuf> {
    let base = source
        .base_name(input, config_type)
        .or_else(|| {
            input
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_string)
        })
        .ok_or_else(|| anyhow!("Cannot derive an output name from {}", input.display()))?;
    let extension = target.file_extension(config_type).ok_or_else(|| {
        SyncError::UnsupportedConfigType {
            format: target.format_name().to_string(),
            config_type,
        }
    })?;
    let dir = input.parent().unwrap_or_else(|| Path::new(""));
    Ok(dir.join(format!("{base}{extension}")))
}

fn merge_in_place(
    cli: &Cli,
    registry: &FormatRegistry,
    input: &Path,
    output: &Path,
    source: &Arc<dyn FormatAdapter>,
    target: &Arc<dyn FormatAdapter>,
    config_type: ConfigType,
) -> Result<bool> {
    let parent_of = |path: &Path| path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut params = SyncParams::new(
        parent_of(input),
        parent_of(output),
        source.format_name(),
        target.format_name(),
        config_type,
    );
    params.strict = cli.strict;
    params.conversion = ConversionOptions {
        add_argument_hint: cli.add_argument_hint,
        add_handoffs: cli.add_handoffs,
    };

    let state = SyncStateStore::open(resolve_state_file(cli.state_file.clone())?);
    let mut orchestrator = SyncOrchestrator::new(registry, params, state)?
        .with_logger(|line: &str| println!("{line}"));
    let report = orchestrator.sync_files_in_place(input, output, true, cli.dry_run)?;

    if report.conversion.has_warnings() {
        println!("{}", report.conversion.generate_report(cli.verbose));
    }
    Ok(report.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubsync_sync::{ClaudeAdapter, CopilotAdapter, GeminiAdapter};

    #[test]
    fn default_output_swaps_extension() {
        let out = default_output(
            Path::new("agents/planner.md"),
            &ClaudeAdapter::new(),
            &CopilotAdapter::new(),
            ConfigType::Agent,
        )
        .unwrap();
        assert_eq!(out, Path::new("agents/planner.agent.md"));

        let out = default_output(
            Path::new("commands/review.md"),
            &ClaudeAdapter::new(),
            &GeminiAdapter::new(),
            ConfigType::SlashCommand,
        )
        .unwrap();
        assert_eq!(out, Path::new("commands/review.toml"));
    }

    #[test]
    fn default_output_rejects_unsupported_target_type() {
        let err = default_output(
            Path::new("settings.json"),
            &ClaudeAdapter::new(),
            &GeminiAdapter::new(),
            ConfigType::Permission,
        )
        .unwrap_err();
        assert!(err.to_string().contains("does not support"));
    }
}
