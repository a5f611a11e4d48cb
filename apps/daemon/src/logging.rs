//! Logger setup.
//!
//! `env_logger` does the filtering and formatting. When `LOG_PATH` is set
//! the stream goes to `loomis.log` in that directory instead of stderr.
//! Warn-and-above records can additionally be forwarded to an Apprise
//! notification endpoint; failures in that sink never affect the daemon.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use log::{Level, LevelFilter, Log, Metadata, Record};
use loomis_core::config::AppriseConfig;
use tokio::sync::mpsc;

const LOG_FILE: &str = "loomis.log";

static LOGGER: OnceLock<DaemonLogger> = OnceLock::new();

struct DaemonLogger {
    inner: env_logger::Logger,
    apprise: OnceLock<mpsc::UnboundedSender<String>>,
}

impl Log for DaemonLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if record.level() <= Level::Warn && self.inner.matches(record) {
            if let Some(tx) = self.apprise.get() {
                let _ = tx.send(format!("{}: {}", record.level(), record.args()));
            }
        }
        self.inner.log(record);
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Initializes the global logger. Call once, before anything logs.
pub fn init(level: LevelFilter, log_dir: Option<&Path>) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp_millis();

    if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE))
            .with_context(|| format!("failed to open log file in {}", dir.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    let logger = DaemonLogger {
        inner: builder.build(),
        apprise: OnceLock::new(),
    };
    LOGGER
        .set(logger)
        .map_err(|_| anyhow!("logger already initialized"))?;

    log::set_max_level(level);
    log::set_logger(LOGGER.get().ok_or_else(|| anyhow!("logger missing"))?)
        .context("failed to install logger")?;
    Ok(())
}

/// Starts the Apprise forwarder when the sink is configured. Must run
/// inside the tokio runtime; a no-op when disabled or unconfigured.
pub fn attach_apprise(config: &AppriseConfig) {
    if !config.enabled || config.url.is_empty() || config.key.is_empty() {
        return;
    }
    let Some(logger) = LOGGER.get() else {
        return;
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    if logger.apprise.set(tx).is_err() {
        return;
    }

    let url = format!("{}/notify/{}", config.url.trim_end_matches('/'), config.key);
    let title = if config.title.is_empty() {
        "Loomis".to_string()
    } else {
        config.title.clone()
    };

    tokio::spawn(async move {
        let client = reqwest::Client::new();
        while let Some(body) = rx.recv().await {
            let payload = serde_json::json!({
                "title": title,
                "body": body,
                "type": "warning",
            });
            if let Err(err) = client.post(&url).json(&payload).send().await {
                // Only to stderr; logging it would loop back into the sink.
                eprintln!("apprise notification failed: {err}");
            }
        }
    });

    log::info!("apprise notifications enabled");
}
