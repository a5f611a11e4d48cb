//! Configuration types for the Loomis daemon.
//!
//! These mirror the keys of the JSON configuration file. Loading and fatal
//! validation live in the binary; the engine consumes the parsed values.
//! Per-entry problems (unknown server names, empty target lists) are not
//! errors at this layer: the services drop the offending entry with a
//! warning and carry on with the rest.

use serde::Deserialize;

/// Connection settings for one media server and its optional tracker.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name used to reference this server from sync entries.
    #[serde(rename = "server_name")]
    pub name: String,

    /// Base URL of the server, e.g. `http://emby.local:8096`.
    pub url: String,

    /// API key/token for the server.
    pub api_key: String,

    /// Base URL of the activity tracker paired with this server.
    #[serde(default)]
    pub tracker_url: Option<String>,

    /// API key for the tracker.
    #[serde(default)]
    pub tracker_api_key: Option<String>,

    /// Prefix that file paths reported by this server share. Used to
    /// rewrite paths when translating items between servers.
    pub media_path: String,
}

/// One family's server list (`plex` or `emby` top-level key).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServersSection {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// Settings for the optional Apprise notification sink.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppriseConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub key: String,
    #[serde(default, rename = "message_title")]
    pub title: String,
}

/// Reference to a target Emby-family server in a collection sync entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetServer {
    pub server: String,
}

/// One collection-to-playlist sync entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSync {
    /// Name of the source Plex-family server.
    pub server: String,
    /// Library on the source server holding the collection.
    pub library: String,
    /// Collection name; the target playlist gets the same name.
    pub collection_name: String,
    #[serde(default)]
    pub target_emby_servers: Vec<TargetServer>,
}

/// Configuration for the collection→playlist synchronizer.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistSyncConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Six-field cron expression for the sync task.
    #[serde(default = "default_sync_cron")]
    pub cron: String,

    /// Delay after playlist mutations before re-reading it; server-side
    /// indexing lags the mutating call.
    #[serde(default = "default_settle_seconds")]
    pub time_for_emby_to_update_seconds: u64,

    /// Delay between successive targets.
    #[serde(default = "default_between_seconds")]
    pub time_between_syncs_seconds: u64,

    #[serde(default)]
    pub plex_collection_sync: Vec<CollectionSync>,
}

impl Default for PlaylistSyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: default_sync_cron(),
            time_for_emby_to_update_seconds: default_settle_seconds(),
            time_between_syncs_seconds: default_between_seconds(),
            plex_collection_sync: Vec::new(),
        }
    }
}

/// One user account bound to a named server.
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub server: String,
    pub user_name: String,
    /// Whether this user may *receive* state from peers. Sources always emit.
    #[serde(default = "default_true")]
    pub can_sync: bool,
}

/// One user-group: the same human across several servers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserGroupConfig {
    #[serde(default)]
    pub plex: Vec<UserConfig>,
    #[serde(default)]
    pub emby: Vec<UserConfig>,
}

/// Configuration for the watch-state synchronizer.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchStateSyncConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Six-field cron expression for the sync task.
    #[serde(default = "default_sync_cron")]
    pub cron: String,

    #[serde(default)]
    pub users: Vec<UserGroupConfig>,
}

impl Default for WatchStateSyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: default_sync_cron(),
            users: Vec::new(),
        }
    }
}

/// Fully parsed daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub plex: ServersSection,
    #[serde(default)]
    pub emby: ServersSection,
    #[serde(default)]
    pub apprise_logging: AppriseConfig,
    #[serde(default)]
    pub playlist_sync: PlaylistSyncConfig,
    #[serde(default)]
    pub watch_state_sync: WatchStateSyncConfig,
    /// Accepted for compatibility; the cleanup subsystem is separate and
    /// ignores are intentional here.
    #[serde(default)]
    pub folder_cleanup: Option<serde_json::Value>,
}

impl Config {
    /// A configuration without a single server cannot drive any service.
    #[must_use]
    pub fn has_servers(&self) -> bool {
        !self.plex.servers.is_empty() || !self.emby.servers.is_empty()
    }
}

fn default_sync_cron() -> String {
    // Every two hours, on the hour.
    "0 0 */2 * * *".to_string()
}

const fn default_settle_seconds() -> u64 {
    5
}

const fn default_between_seconds() -> u64 {
    1
}

const fn default_true() -> bool {
    true
}
