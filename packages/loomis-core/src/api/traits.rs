//! Capability traits for the upstream clients.
//!
//! The synchronizers depend on these traits rather than the concrete HTTP
//! implementations, which keeps the sync algorithms testable with in-memory
//! fakes. One concrete implementation exists per trait.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::ApiResult;
use super::types::{
    Collection, MediaItem, PathMapEntry, PlayState, Playlist, SearchBy, User, WatchEvent,
};

/// Operations against a Plex-family server.
#[async_trait]
pub trait PlexClient: Send + Sync {
    /// Server reachable and credential accepted.
    async fn ping(&self) -> bool;

    /// The name the server reports for itself.
    async fn server_reported_name(&self) -> ApiResult<String>;

    /// Resolves a library name to its section id.
    async fn library_id(&self, library: &str) -> ApiResult<Option<String>>;

    /// Fetches an ordered collection with each item's alternate file paths.
    async fn collection(&self, library: &str, name: &str) -> ApiResult<Option<Collection>>;

    /// Batch path lookup by item id. Ids without a path are absent from
    /// the result.
    async fn item_paths_by_ids(&self, ids: &[String]) -> ApiResult<HashMap<String, String>>;

    /// Title search across the whole server, with the requesting account's
    /// watch state on each hit.
    async fn search_title(&self, query: &str) -> ApiResult<Vec<MediaItem>>;

    async fn mark_watched(&self, id: &str) -> ApiResult<()>;

    /// Sets the playback position in milliseconds.
    async fn set_position(&self, id: &str, position_ms: i64) -> ApiResult<()>;

    async fn trigger_scan(&self, library_id: &str) -> ApiResult<()>;
}

/// Operations against an Emby-family server.
#[async_trait]
pub trait EmbyClient: Send + Sync {
    async fn ping(&self) -> bool;

    async fn server_reported_name(&self) -> ApiResult<String>;

    async fn library_id(&self, library: &str) -> ApiResult<Option<String>>;

    /// Finds a single item by id, exact name, or exact path.
    async fn find_item(
        &self,
        by: SearchBy,
        query: &str,
        extra_filters: &[(&str, &str)],
    ) -> ApiResult<Option<MediaItem>>;

    async fn find_user(&self, name: &str) -> ApiResult<Option<User>>;

    /// Full library dump of movies and episodes with path and
    /// date-modified, for the path-map rebuild.
    async fn path_map_snapshot(&self) -> ApiResult<Vec<PathMapEntry>>;

    /// Date-modified stamp of the single most recently modified item, the
    /// cheap probe behind library-changed-since.
    async fn latest_change_stamp(&self) -> ApiResult<Option<String>>;

    async fn playlist(&self, name: &str) -> ApiResult<Option<Playlist>>;

    async fn playlist_exists(&self, name: &str) -> ApiResult<bool>;

    async fn create_playlist(&self, name: &str, item_ids: &[String]) -> ApiResult<()>;

    async fn add_to_playlist(&self, playlist_id: &str, item_ids: &[String]) -> ApiResult<()>;

    /// Removes slots by *entry* id, not item id.
    async fn remove_from_playlist(&self, playlist_id: &str, entry_ids: &[String]) -> ApiResult<()>;

    /// Moves the slot with `entry_id` to `new_index`.
    async fn move_in_playlist(
        &self,
        playlist_id: &str,
        entry_id: &str,
        new_index: u32,
    ) -> ApiResult<()>;

    async fn watched_status(&self, user_id: &str, item_id: &str) -> ApiResult<bool>;

    async fn set_watched(&self, user_id: &str, item_id: &str) -> ApiResult<()>;

    async fn play_state(&self, user_id: &str, item_id: &str) -> ApiResult<Option<PlayState>>;

    /// Sets the playback position in ticks along with the last-played
    /// timestamp (ISO-8601).
    async fn set_play_state(
        &self,
        user_id: &str,
        item_id: &str,
        position_ticks: i64,
        last_played_iso: &str,
    ) -> ApiResult<()>;

    async fn trigger_scan(&self, library_id: &str) -> ApiResult<()>;
}

/// Operations against the Plex family's activity tracker.
#[async_trait]
pub trait TautulliClient: Send + Sync {
    async fn ping(&self) -> bool;

    /// Resolves an account name to its tracker-side identity.
    async fn user_info(&self, name: &str) -> ApiResult<Option<User>>;

    /// Playback history for a user since a local date (`YYYY-MM-DD`).
    async fn watch_history(&self, user_name: &str, after_date: &str)
        -> ApiResult<Vec<WatchEvent>>;
}

/// Operations against the Emby family's activity tracker.
#[async_trait]
pub trait JellystatClient: Send + Sync {
    async fn ping(&self) -> bool;

    /// Playback history for a user by server-side user id.
    async fn watch_history(&self, user_id: &str) -> ApiResult<Vec<WatchEvent>>;
}
