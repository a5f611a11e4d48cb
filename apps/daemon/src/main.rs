//! Loomis daemon - standalone watch-state and playlist synchronization
//! daemon for Plex- and Emby-family media servers.
//!
//! The binary is a thin shell around `loomis-core`: it parses CLI
//! arguments, loads the configuration, initializes logging, bridges
//! process signals to a shutdown future, and hands control to the
//! service manager.

mod config;
mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use loomis_core::ServiceManager;
use tokio::signal;

/// Loomis - media server synchronization daemon.
#[derive(Parser, Debug)]
#[command(name = "loomis-daemon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding config.json.
    #[arg(short, long, value_name = "DIR", env = "CONFIG_PATH")]
    config_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "LOOMIS_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Directory for the log file; stderr only when unset.
    #[arg(long, value_name = "DIR", env = "LOG_PATH")]
    log_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(args.log_level, args.log_path.as_deref())
        .context("failed to initialize logging")?;

    // An unusable configuration is fatal: exit code 1.
    let config = config::load(args.config_dir.as_deref())?;

    logging::attach_apprise(&config.apprise_logging);

    log::info!("Loomis {} starting", env!("CARGO_PKG_VERSION"));

    let manager = ServiceManager::build(&config).await;
    manager.run(shutdown_signal()).await;

    log::info!("shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
