//! # Cloud-Native Deployer
//!
//! Daemon hosting the deployment core: the status poll worker, post-deploy
//! handlers, and the metrics and probe endpoints.
//!
//! ## Usage
//!
//! ```bash
//! cnative-deployer --metrics-port 5000 --log-format text
//! ```
//!
//! Every flag falls back to its environment variable, then to the
//! [`Settings`](cnative_deployer::config::Settings) default.

use anyhow::{Context, Result};
use clap::Parser;
use cnative_deployer::runtime::{initialize, InitOptions};
use std::sync::atomic::Ordering;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cnative-deployer", version, about = "Cloud-native application deployment core")]
struct Cli {
    /// Port of the metrics and probe server
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Log output format: json or text
    #[arg(long, env = "LOG_FORMAT")]
    log_format: Option<String>,

    /// Do not hot-reload settings from the settings ConfigMap
    #[arg(long)]
    no_config_watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let init = initialize(InitOptions {
        metrics_port: cli.metrics_port,
        log_format: cli.log_format,
        config_watch: !cli.no_config_watch,
    })
    .await
    .context("Failed to initialize deployer")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal, stopping");

    init.server_state.is_ready.store(false, Ordering::Relaxed);
    init.components.shutdown();
    Ok(())
}
