//! `docker-volume-gcs check`: validate the configuration and report it.

use std::path::Path;

use anyhow::Context;
use clap::Args;
use gcsvol_common::config::PluginConfig;
use gcsvol_supervisor::process::GcsfuseLauncher;
use serde::Serialize;

use super::ConfigArgs;

/// Arguments for the `check` command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Plugin configuration flags.
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// What `check` prints: the resolved configuration and mounter path.
#[derive(Debug, Serialize)]
struct Report<'a> {
    config: &'a PluginConfig,
    mounter: &'a Path,
}

/// Executes the `check` command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the mounter cannot
/// be found.
pub fn execute(args: CheckArgs) -> anyhow::Result<()> {
    let config = args.config.into_config();
    let launcher = preflight(&config)?;
    let report = Report {
        config: &config,
        mounter: launcher.program(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Startup checks shared with `serve`.
///
/// # Errors
///
/// Returns an error if validation fails or the mounter is not installed.
pub fn preflight(config: &PluginConfig) -> anyhow::Result<GcsfuseLauncher> {
    config.validate().context("invalid configuration")?;
    let launcher = GcsfuseLauncher::locate(&config.mounter)
        .with_context(|| format!("cannot run {}", config.mounter.display()))?;
    tracing::debug!(mounter = %launcher.program().display(), "mounter found");
    Ok(launcher)
}
