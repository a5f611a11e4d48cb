//! Shared in-memory client fakes for engine tests.
//!
//! The mocks hold their state behind plain mutexes, record every mutating
//! call in an `ops` journal for order/count assertions, and let tests
//! inject failures per operation name.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::{ApiError, ApiResult};
use super::traits::{EmbyClient, JellystatClient, PlexClient, TautulliClient};
use super::types::{
    Collection, MediaItem, MediaKind, PathMapEntry, PlayState, Playlist, PlaylistEntry, SearchBy,
    User, WatchEvent,
};

/// Builds a minimal movie item for search results.
pub fn media_item(id: &str, title: &str, path: &str) -> MediaItem {
    MediaItem {
        id: id.to_string(),
        kind: MediaKind::Movie,
        title: title.to_string(),
        full_title: title.to_string(),
        path: path.to_string(),
        duration_ms: 0,
        watched: false,
        playback_percent: 0,
        series_name: None,
        season_num: None,
        episode_num: None,
    }
}

/// Builds a watch event with the given identity and timestamp.
pub fn watch_event(item_id: &str, title: &str, watched_at: &str) -> WatchEvent {
    WatchEvent {
        item_id: item_id.to_string(),
        full_title: title.to_string(),
        watched: false,
        playback_percent: 0,
        watched_at: watched_at.to_string(),
        series_name: None,
        episode_id: None,
    }
}

/// Builds a play state with a percentage and runtime.
pub fn play_state(path: &str, percent: f64, runtime_ticks: i64, played: bool) -> PlayState {
    PlayState {
        path: path.to_string(),
        played_percent: percent,
        runtime_ticks,
        position_ticks: (runtime_ticks as f64 * percent / 100.0) as i64,
        play_count: i64::from(played),
        played,
    }
}

fn fail(op: &str) -> ApiError {
    ApiError::Status(500, format!("{op} forced to fail"))
}

// ─────────────────────────────────────────────────────────────────────────────
// MockEmby
// ─────────────────────────────────────────────────────────────────────────────

/// Emby-family fake with a live playlist state machine: adds append, moves
/// and removals re-shape the stored playlist, so a re-fetch observes the
/// server-side result.
#[derive(Default)]
pub struct MockEmby {
    pub users: Mutex<Vec<User>>,
    pub items: Mutex<Vec<MediaItem>>,
    pub playlists: Mutex<HashMap<String, Playlist>>,
    pub snapshot: Mutex<Vec<PathMapEntry>>,
    pub latest_stamp: Mutex<Option<String>>,
    pub watched: Mutex<HashMap<(String, String), bool>>,
    pub play_states: Mutex<HashMap<(String, String), PlayState>>,
    pub offline: Mutex<bool>,
    pub fail_ops: Mutex<HashSet<&'static str>>,
    pub ops: Mutex<Vec<String>>,
    entry_counter: AtomicUsize,
}

impl MockEmby {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, op: String) {
        self.ops.lock().push(op);
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().clone()
    }

    fn check(&self, op: &'static str) -> ApiResult<()> {
        if self.fail_ops.lock().contains(op) {
            return Err(fail(op));
        }
        Ok(())
    }

    fn next_entry_id(&self) -> String {
        format!("p{}", self.entry_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Seeds a playlist; entry ids are `(item_id, entry_id, name)`.
    pub fn seed_playlist(&self, id: &str, name: &str, entries: &[(&str, &str, &str)]) {
        let playlist = Playlist {
            id: id.to_string(),
            name: name.to_string(),
            entries: entries
                .iter()
                .map(|(item_id, entry_id, name)| PlaylistEntry {
                    item_id: (*item_id).to_string(),
                    entry_id: (*entry_id).to_string(),
                    name: (*name).to_string(),
                })
                .collect(),
        };
        self.playlists.lock().insert(name.to_string(), playlist);
    }

    /// Ordered item ids of a stored playlist.
    pub fn playlist_item_ids(&self, name: &str) -> Vec<String> {
        self.playlists
            .lock()
            .get(name)
            .map(|p| p.entries.iter().map(|e| e.item_id.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EmbyClient for MockEmby {
    async fn ping(&self) -> bool {
        !*self.offline.lock()
    }

    async fn server_reported_name(&self) -> ApiResult<String> {
        Ok("mock-emby".into())
    }

    async fn library_id(&self, _library: &str) -> ApiResult<Option<String>> {
        Ok(Some("lib1".into()))
    }

    async fn find_item(
        &self,
        by: SearchBy,
        query: &str,
        _extra_filters: &[(&str, &str)],
    ) -> ApiResult<Option<MediaItem>> {
        self.check("find_item")?;
        Ok(self
            .items
            .lock()
            .iter()
            .find(|item| match by {
                SearchBy::Id => item.id == query,
                SearchBy::Name => item.title == query,
                SearchBy::Path => item.path == query,
            })
            .cloned())
    }

    async fn find_user(&self, name: &str) -> ApiResult<Option<User>> {
        self.check("find_user")?;
        Ok(self.users.lock().iter().find(|u| u.name == name).cloned())
    }

    async fn path_map_snapshot(&self) -> ApiResult<Vec<PathMapEntry>> {
        self.record("snapshot".into());
        self.check("path_map_snapshot")?;
        Ok(self.snapshot.lock().clone())
    }

    async fn latest_change_stamp(&self) -> ApiResult<Option<String>> {
        self.check("latest_change_stamp")?;
        Ok(self.latest_stamp.lock().clone())
    }

    async fn playlist(&self, name: &str) -> ApiResult<Option<Playlist>> {
        self.check("playlist")?;
        Ok(self.playlists.lock().get(name).cloned())
    }

    async fn playlist_exists(&self, name: &str) -> ApiResult<bool> {
        Ok(self.playlists.lock().contains_key(name))
    }

    async fn create_playlist(&self, name: &str, item_ids: &[String]) -> ApiResult<()> {
        self.record(format!("create:{}:{}", name, item_ids.join(",")));
        self.check("create_playlist")?;
        let entries = item_ids
            .iter()
            .map(|item_id| PlaylistEntry {
                item_id: item_id.clone(),
                entry_id: self.next_entry_id(),
                name: String::new(),
            })
            .collect();
        self.playlists.lock().insert(
            name.to_string(),
            Playlist {
                id: format!("pl-{name}"),
                name: name.to_string(),
                entries,
            },
        );
        Ok(())
    }

    async fn add_to_playlist(&self, playlist_id: &str, item_ids: &[String]) -> ApiResult<()> {
        self.record(format!("add:{}", item_ids.join(",")));
        self.check("add_to_playlist")?;
        let mut playlists = self.playlists.lock();
        if let Some(playlist) = playlists.values_mut().find(|p| p.id == playlist_id) {
            for item_id in item_ids {
                let entry_id = self.next_entry_id();
                playlist.entries.push(PlaylistEntry {
                    item_id: item_id.clone(),
                    entry_id,
                    name: String::new(),
                });
            }
        }
        Ok(())
    }

    async fn remove_from_playlist(&self, playlist_id: &str, entry_ids: &[String]) -> ApiResult<()> {
        self.record(format!("remove:{}", entry_ids.join(",")));
        self.check("remove_from_playlist")?;
        let mut playlists = self.playlists.lock();
        if let Some(playlist) = playlists.values_mut().find(|p| p.id == playlist_id) {
            playlist
                .entries
                .retain(|entry| !entry_ids.contains(&entry.entry_id));
        }
        Ok(())
    }

    async fn move_in_playlist(
        &self,
        playlist_id: &str,
        entry_id: &str,
        new_index: u32,
    ) -> ApiResult<()> {
        self.record(format!("move:{entry_id}:{new_index}"));
        self.check("move_in_playlist")?;
        let mut playlists = self.playlists.lock();
        if let Some(playlist) = playlists.values_mut().find(|p| p.id == playlist_id) {
            if let Some(pos) = playlist.entries.iter().position(|e| e.entry_id == entry_id) {
                let entry = playlist.entries.remove(pos);
                let index = (new_index as usize).min(playlist.entries.len());
                playlist.entries.insert(index, entry);
            }
        }
        Ok(())
    }

    async fn watched_status(&self, user_id: &str, item_id: &str) -> ApiResult<bool> {
        self.check("watched_status")?;
        Ok(*self
            .watched
            .lock()
            .get(&(user_id.to_string(), item_id.to_string()))
            .unwrap_or(&false))
    }

    async fn set_watched(&self, user_id: &str, item_id: &str) -> ApiResult<()> {
        self.record(format!("set_watched:{user_id}:{item_id}"));
        self.check("set_watched")?;
        self.watched
            .lock()
            .insert((user_id.to_string(), item_id.to_string()), true);
        Ok(())
    }

    async fn play_state(&self, user_id: &str, item_id: &str) -> ApiResult<Option<PlayState>> {
        self.check("play_state")?;
        Ok(self
            .play_states
            .lock()
            .get(&(user_id.to_string(), item_id.to_string()))
            .cloned())
    }

    async fn set_play_state(
        &self,
        user_id: &str,
        item_id: &str,
        position_ticks: i64,
        last_played_iso: &str,
    ) -> ApiResult<()> {
        self.record(format!(
            "set_play_state:{user_id}:{item_id}:{position_ticks}:{last_played_iso}"
        ));
        self.check("set_play_state")?;
        Ok(())
    }

    async fn trigger_scan(&self, library_id: &str) -> ApiResult<()> {
        self.record(format!("scan:{library_id}"));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MockPlex
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockPlex {
    /// Collections keyed by (library, collection name).
    pub collections: Mutex<HashMap<(String, String), Collection>>,
    pub item_paths: Mutex<HashMap<String, String>>,
    /// Search results keyed by query string.
    pub search_results: Mutex<HashMap<String, Vec<MediaItem>>>,
    pub offline: Mutex<bool>,
    pub fail_ops: Mutex<HashSet<&'static str>>,
    pub ops: Mutex<Vec<String>>,
}

impl MockPlex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().clone()
    }

    fn check(&self, op: &'static str) -> ApiResult<()> {
        if self.fail_ops.lock().contains(op) {
            return Err(fail(op));
        }
        Ok(())
    }
}

#[async_trait]
impl PlexClient for MockPlex {
    async fn ping(&self) -> bool {
        !*self.offline.lock()
    }

    async fn server_reported_name(&self) -> ApiResult<String> {
        Ok("mock-plex".into())
    }

    async fn library_id(&self, _library: &str) -> ApiResult<Option<String>> {
        Ok(Some("1".into()))
    }

    async fn collection(&self, library: &str, name: &str) -> ApiResult<Option<Collection>> {
        self.check("collection")?;
        Ok(self
            .collections
            .lock()
            .get(&(library.to_string(), name.to_string()))
            .cloned())
    }

    async fn item_paths_by_ids(&self, ids: &[String]) -> ApiResult<HashMap<String, String>> {
        self.check("item_paths_by_ids")?;
        let paths = self.item_paths.lock();
        Ok(ids
            .iter()
            .filter_map(|id| paths.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }

    async fn search_title(&self, query: &str) -> ApiResult<Vec<MediaItem>> {
        self.check("search_title")?;
        Ok(self
            .search_results
            .lock()
            .get(query)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_watched(&self, id: &str) -> ApiResult<()> {
        self.ops.lock().push(format!("mark_watched:{id}"));
        self.check("mark_watched")?;
        Ok(())
    }

    async fn set_position(&self, id: &str, position_ms: i64) -> ApiResult<()> {
        self.ops.lock().push(format!("set_position:{id}:{position_ms}"));
        self.check("set_position")?;
        Ok(())
    }

    async fn trigger_scan(&self, library_id: &str) -> ApiResult<()> {
        self.ops.lock().push(format!("scan:{library_id}"));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MockTautulli / MockJellystat
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockTautulli {
    pub user: Mutex<Option<User>>,
    pub history: Mutex<Vec<WatchEvent>>,
    pub offline: Mutex<bool>,
}

impl MockTautulli {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl TautulliClient for MockTautulli {
    async fn ping(&self) -> bool {
        !*self.offline.lock()
    }

    async fn user_info(&self, _name: &str) -> ApiResult<Option<User>> {
        if *self.offline.lock() {
            return Err(fail("user_info"));
        }
        Ok(self.user.lock().clone())
    }

    async fn watch_history(
        &self,
        _user_name: &str,
        _after_date: &str,
    ) -> ApiResult<Vec<WatchEvent>> {
        Ok(self.history.lock().clone())
    }
}

#[derive(Default)]
pub struct MockJellystat {
    pub history: Mutex<Vec<WatchEvent>>,
    pub offline: Mutex<bool>,
}

impl MockJellystat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl JellystatClient for MockJellystat {
    async fn ping(&self) -> bool {
        !*self.offline.lock()
    }

    async fn watch_history(&self, _user_id: &str) -> ApiResult<Vec<WatchEvent>> {
        if *self.offline.lock() {
            return Err(fail("watch_history"));
        }
        Ok(self.history.lock().clone())
    }
}
