//! `docker-volume-gcs serve`: run the plugin until SIGINT or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use gcsvol_plugin::PluginServer;
use gcsvol_supervisor::Supervisor;
use gcsvol_supervisor::relay::StderrSink;
use tokio::sync::Notify;

use super::ConfigArgs;
use super::check::preflight;

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Plugin configuration flags.
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Executes the `serve` command.
///
/// Every mounter still running when the server stops is interrupted and
/// reaped before returning.
///
/// # Errors
///
/// Returns an error if startup checks fail, the socket cannot be served, or
/// a mounter does not stop cleanly.
pub fn execute(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.config.into_config();
    let launcher = preflight(&config)?;
    std::fs::create_dir_all(&config.root)
        .with_context(|| format!("failed to create root {}", config.root.display()))?;

    tracing::info!(
        root = %config.root.display(),
        socket = %config.socket.display(),
        mounter = %launcher.program().display(),
        timeout = ?config.startup_timeout,
        "starting gcs volume plugin"
    );

    let socket = config.socket.clone();
    let supervisor = Arc::new(Supervisor::with_launcher(
        config,
        Box::new(launcher),
        Box::new(StderrSink),
    ));

    let stop = Arc::new(Notify::new());
    let signal = Arc::clone(&stop);
    ctrlc::set_handler(move || signal.notify_one()).context("failed to install signal handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let server = PluginServer::new(Arc::clone(&supervisor));
    let served = runtime.block_on(server.run(&socket, async move {
        stop.notified().await;
        tracing::info!("shutdown requested");
    }));

    let stopped = supervisor.shutdown();
    served.context("plugin server failed")?;
    stopped.context("failed to stop every mounter")?;
    tracing::info!("plugin exited");
    Ok(())
}
