//! Domain types shared by the upstream clients and the synchronizers.
//!
//! All of these are transient per-request values: a sync cycle materializes
//! them from upstream responses and discards them at the end of the cycle.

/// Broad classification of a media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Movie,
    Episode,
    Other,
}

impl MediaKind {
    /// Maps an upstream item-type string (`Movie`, `Episode`, `movie`, ...)
    /// to a kind. Anything unrecognized is [`MediaKind::Other`].
    #[must_use]
    pub fn from_type_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("movie") {
            Self::Movie
        } else if s.eq_ignore_ascii_case("episode") {
            Self::Episode
        } else {
            Self::Other
        }
    }
}

/// One media item as reported by a server.
///
/// `path` is absolute on the server that produced the item. `watched` and
/// `playback_percent` reflect the requesting user's state when the query
/// was user-scoped (title search), and are defaults otherwise.
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub id: String,
    pub kind: MediaKind,
    pub title: String,
    /// Display title; for episodes this includes the series name.
    pub full_title: String,
    pub path: String,
    pub duration_ms: i64,
    pub watched: bool,
    pub playback_percent: i32,
    pub series_name: Option<String>,
    pub season_num: Option<u32>,
    pub episode_num: Option<u32>,
}

/// One entry of an ordered collection. `paths` lists the on-disk
/// alternatives for the same logical item (multi-edition).
#[derive(Debug, Clone)]
pub struct CollectionItem {
    pub title: String,
    pub paths: Vec<String>,
}

/// An ordered, curator-defined collection on a Plex-family server.
#[derive(Debug, Clone)]
pub struct Collection {
    pub name: String,
    pub items: Vec<CollectionItem>,
}

/// One slot of a playlist. `entry_id` identifies the slot itself and is
/// what moves and removals address; `item_id` is the referenced media item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub item_id: String,
    pub entry_id: String,
    pub name: String,
}

/// An ordered playlist on an Emby-family server.
#[derive(Debug, Clone)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub entries: Vec<PlaylistEntry>,
}

/// A user's playback state for one item on an Emby-family server.
///
/// Positions are in ticks (100 ns units); the Plex family speaks
/// milliseconds and conversion happens at the synchronizer.
#[derive(Debug, Clone)]
pub struct PlayState {
    pub path: String,
    pub played_percent: f64,
    pub runtime_ticks: i64,
    pub position_ticks: i64,
    pub play_count: i64,
    pub played: bool,
}

/// One playback event from an activity tracker.
///
/// `watched_at` is ISO-8601 UTC; tracker-native epoch timestamps are
/// converted once at the client edge so consolidation and cutoffs can
/// compare lexically. Events from the Emby-family tracker carry neither a
/// watched flag nor a percentage; those are filled from the server's play
/// state during the sync.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub item_id: String,
    pub full_title: String,
    pub watched: bool,
    pub playback_percent: i32,
    pub watched_at: String,
    pub series_name: Option<String>,
    /// For series history on the Emby family the playable item is the
    /// episode, not the reported item.
    pub episode_id: Option<String>,
}

/// A server-side user account.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
}

/// One row of a full library dump used to build the path map.
#[derive(Debug, Clone)]
pub struct PathMapEntry {
    pub path: String,
    pub id: String,
    pub date_modified: String,
}

/// Lookup key kind for [`EmbyClient::find_item`](super::EmbyClient::find_item).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBy {
    Id,
    Name,
    Path,
}
