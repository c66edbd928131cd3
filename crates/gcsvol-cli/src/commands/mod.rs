//! CLI command definitions and dispatch.

pub mod check;
pub mod serve;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use gcsvol_common::config::PluginConfig;
use gcsvol_common::constants;

use crate::logging::LogFormat;

/// Docker volume plugin for Google Cloud Storage buckets.
#[derive(Parser, Debug)]
#[command(name = constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t, env = "GCSVOL_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the volume plugin protocol until interrupted.
    Serve(serve::ServeArgs),
    /// Validate the configuration, locate the mounter and print both.
    Check(check::CheckArgs),
}

/// Flags shared by every subcommand that builds a [`PluginConfig`].
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Root directory for all mountpoints of this plugin.
    #[arg(long, env = "GCSVOL_ROOT", default_value = constants::DEFAULT_ROOT)]
    pub root: PathBuf,

    /// Service account key (JSON) handed to gcsfuse.
    #[arg(long, env = "GCSVOL_KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Mounter executable.
    #[arg(long, env = "GCSVOL_MOUNTER", default_value = constants::MOUNTER_BINARY)]
    pub mounter: PathBuf,

    /// Extra flag passed to the mounter; repeat for several.
    #[arg(long = "mounter-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub mounter_args: Vec<String>,

    /// Unix socket to serve the plugin protocol on.
    #[arg(long, env = "GCSVOL_SOCKET", default_value = constants::DEFAULT_SOCKET)]
    pub socket: PathBuf,

    /// Seconds to wait for gcsfuse to report its mount status (0 waits forever).
    #[arg(
        long,
        env = "GCSVOL_STARTUP_TIMEOUT",
        value_name = "SECS",
        default_value_t = constants::DEFAULT_STARTUP_TIMEOUT_SECS
    )]
    pub startup_timeout: u64,
}

impl ConfigArgs {
    /// Resolves the flags into a plugin configuration.
    #[must_use]
    pub fn into_config(self) -> PluginConfig {
        PluginConfig {
            root: self.root,
            key_file: self.key_file,
            mounter: self.mounter,
            mounter_args: self.mounter_args,
            socket: self.socket,
            startup_timeout: (self.startup_timeout > 0)
                .then(|| Duration::from_secs(self.startup_timeout)),
        }
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => serve::execute(args),
        Command::Check(args) => check::execute(args),
    }
}
