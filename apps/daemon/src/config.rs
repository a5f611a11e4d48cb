//! Configuration file loading.
//!
//! The daemon reads `config.json` from the directory named by
//! `CONFIG_PATH` (or `--config-dir`). A missing directory, unreadable
//! file, parse failure, or a configuration without any servers is fatal:
//! the process exits with code 1.

use std::path::Path;

use anyhow::{bail, Context, Result};
use loomis_core::Config;

const CONFIG_FILE: &str = "config.json";

/// Loads and validates the daemon configuration.
pub fn load(dir: Option<&Path>) -> Result<Config> {
    let Some(dir) = dir else {
        bail!("no configuration directory: set CONFIG_PATH or pass --config-dir");
    };

    let path = dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;

    if !config.has_servers() {
        bail!("no servers configured in {}", path.display());
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) {
        std::fs::write(dir.path().join(CONFIG_FILE), content).unwrap();
    }

    const MINIMAL: &str = r#"{
        "emby": {"servers": [{
            "server_name": "loft",
            "url": "http://emby.local:8096",
            "api_key": "k",
            "media_path": "/media"
        }]}
    }"#;

    #[test]
    fn loads_minimal_config() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, MINIMAL);
        let config = load(Some(dir.path())).unwrap();
        assert_eq!(config.emby.servers.len(), 1);
    }

    #[test]
    fn missing_directory_is_fatal() {
        assert!(load(None).is_err());
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        assert!(load(Some(dir.path())).is_err());
    }

    #[test]
    fn unparseable_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "{not json");
        assert!(load(Some(dir.path())).is_err());
    }

    #[test]
    fn config_without_servers_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "{}");
        assert!(load(Some(dir.path())).is_err());
    }
}
