//! Emby-family server client.
//!
//! JSON transport with a query-string `api_key` and the `/emby` path
//! prefix. Playlist slots are addressed by `PlaylistItemId` (the entry id),
//! which is distinct from the item id; positions are in ticks (100 ns).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::error::{check_response, ApiError, ApiResult};
use super::traits::EmbyClient;
use super::types::{
    MediaItem, MediaKind, PathMapEntry, PlayState, Playlist, PlaylistEntry, SearchBy, User,
};
use super::{comma_separated, encode, http_client};

const API_PREFIX: &str = "/emby";
const API_SYSTEM_INFO: &str = "/System/Info";
const API_MEDIA_FOLDERS: &str = "/Library/SelectableMediaFolders";
const API_ITEMS: &str = "/Items";
const API_PLAYLISTS: &str = "/Playlists";
const API_USERS: &str = "/Users";

/// Emby-family HTTP client.
pub struct EmbyApi {
    base_url: String,
    api_key: String,
    client: Client,
}

impl EmbyApi {
    /// Creates a client for one server (reuses the shared connection pool).
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: http_client(),
        }
    }

    /// Builds a key-authenticated URL for an API path.
    fn url(&self, path: &str) -> String {
        format!(
            "{}{}{}?api_key={}",
            self.base_url, API_PREFIX, path, self.api_key
        )
    }

    /// Appends already-encoded query parameters.
    fn push_params(url: &mut String, params: &[(&str, &str)]) {
        for (key, value) in params {
            url.push_str(&format!("&{key}={value}"));
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
    ) -> ApiResult<T> {
        let response = self.client.get(url).send().await.map_err(|err| {
            log::warn!("[Emby] {operation} request failed: {err}");
            ApiError::from(err)
        })?;
        match check_response(response).await {
            Ok(ok) => {
                let body = ok.text().await?;
                serde_json::from_str(&body).map_err(|err| {
                    log::warn!("[Emby] {operation} returned an undecodable body: {err}");
                    ApiError::Decode(err.to_string())
                })
            }
            Err(err) => {
                log::warn!("[Emby] {operation} {err}");
                Err(err)
            }
        }
    }

    async fn post(
        &self,
        operation: &'static str,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> ApiResult<()> {
        let mut request = self.client.post(url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(|err| {
            tracing::warn!(operation, error = %err, "Emby request failed");
            ApiError::from(err)
        })?;
        match check_response(response).await {
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::warn!(operation, error = %err, "Emby request rejected");
                Err(err)
            }
        }
    }

    fn search_param(by: SearchBy) -> &'static str {
        match by {
            SearchBy::Id => "Ids",
            SearchBy::Name => "SearchTerm",
            SearchBy::Path => "Path",
        }
    }

    /// Raw `/Items` query used by both `find_item` and the playlist lookup.
    async fn query_items(
        &self,
        by: SearchBy,
        query: &str,
        extra_filters: &[(&str, &str)],
    ) -> ApiResult<ItemsResponse> {
        let mut url = self.url(API_ITEMS);
        Self::push_params(
            &mut url,
            &[
                ("Recursive", "true"),
                (Self::search_param(by), &encode(query)),
                ("Fields", "Path"),
            ],
        );
        Self::push_params(&mut url, extra_filters);
        self.get_json("find_item", &url).await
    }
}

#[async_trait]
impl EmbyClient for EmbyApi {
    async fn ping(&self) -> bool {
        let url = self.url(API_SYSTEM_INFO);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn server_reported_name(&self) -> ApiResult<String> {
        let info: SystemInfo = self
            .get_json("server_reported_name", &self.url(API_SYSTEM_INFO))
            .await?;
        info.server_name.ok_or(ApiError::Missing("ServerName"))
    }

    async fn library_id(&self, library: &str) -> ApiResult<Option<String>> {
        let folders: Vec<MediaFolder> = self
            .get_json("library_id", &self.url(API_MEDIA_FOLDERS))
            .await?;
        Ok(folders
            .into_iter()
            .find(|folder| folder.name == library)
            .map(|folder| folder.id))
    }

    async fn find_item(
        &self,
        by: SearchBy,
        query: &str,
        extra_filters: &[(&str, &str)],
    ) -> ApiResult<Option<MediaItem>> {
        let response = self.query_items(by, query, extra_filters).await?;
        // The server search is fuzzy; keep only an exact match on the
        // queried field.
        let matched = response.items.into_iter().find(|item| match by {
            SearchBy::Id => item.id == query,
            SearchBy::Name => item.name == query,
            SearchBy::Path => item.path.as_deref() == Some(query),
        });
        Ok(matched.map(EmbyItem::into_media_item))
    }

    async fn find_user(&self, name: &str) -> ApiResult<Option<User>> {
        let users: Vec<EmbyUser> = self.get_json("find_user", &self.url(API_USERS)).await?;
        Ok(users
            .into_iter()
            .find(|user| user.name == name)
            .map(|user| User {
                id: user.id,
                name: user.name,
            }))
    }

    async fn path_map_snapshot(&self) -> ApiResult<Vec<PathMapEntry>> {
        let mut url = self.url(API_ITEMS);
        Self::push_params(
            &mut url,
            &[
                ("Recursive", "true"),
                ("IncludeItemTypes", "Movie,Episode"),
                ("Fields", "Path,DateLastSaved"),
                ("ExcludeLocationTypes", "Virtual"),
            ],
        );
        let response: ItemsResponse = self.get_json("path_map_snapshot", &url).await?;
        Ok(response
            .items
            .into_iter()
            .map(|item| PathMapEntry {
                path: item.path.unwrap_or_default(),
                id: item.id,
                date_modified: item.date_last_saved.unwrap_or_default(),
            })
            .collect())
    }

    async fn latest_change_stamp(&self) -> ApiResult<Option<String>> {
        let mut url = self.url(API_ITEMS);
        Self::push_params(
            &mut url,
            &[
                ("Recursive", "true"),
                ("IncludeItemTypes", "Movie,Episode"),
                ("Fields", "DateLastSaved"),
                ("ExcludeLocationTypes", "Virtual"),
                ("SortBy", "DateLastSaved"),
                ("SortOrder", "Descending"),
                ("Limit", "1"),
            ],
        );
        let response: ItemsResponse = self.get_json("latest_change_stamp", &url).await?;
        Ok(response
            .items
            .into_iter()
            .next()
            .and_then(|item| item.date_last_saved))
    }

    async fn playlist(&self, name: &str) -> ApiResult<Option<Playlist>> {
        let Some(item) = self
            .find_item(SearchBy::Name, name, &[("IncludeItemTypes", "Playlist")])
            .await?
        else {
            return Ok(None);
        };

        let url = self.url(&format!("{API_PLAYLISTS}/{}/Items", item.id));
        let response: ItemsResponse = self.get_json("playlist", &url).await?;
        let entries = response
            .items
            .into_iter()
            .map(|entry| PlaylistEntry {
                item_id: entry.id,
                entry_id: entry.playlist_item_id.unwrap_or_default(),
                name: entry.name,
            })
            .collect();
        Ok(Some(Playlist {
            id: item.id,
            name: item.title,
            entries,
        }))
    }

    async fn playlist_exists(&self, name: &str) -> ApiResult<bool> {
        Ok(self
            .find_item(SearchBy::Name, name, &[("IncludeItemTypes", "Playlist")])
            .await?
            .is_some())
    }

    async fn create_playlist(&self, name: &str, item_ids: &[String]) -> ApiResult<()> {
        let mut url = self.url(API_PLAYLISTS);
        Self::push_params(
            &mut url,
            &[
                ("Name", &encode(name)),
                ("Ids", &comma_separated(item_ids)),
                ("MediaType", "Movies"),
            ],
        );
        self.post("create_playlist", &url, None).await
    }

    async fn add_to_playlist(&self, playlist_id: &str, item_ids: &[String]) -> ApiResult<()> {
        let mut url = self.url(&format!("{API_PLAYLISTS}/{playlist_id}/Items"));
        Self::push_params(&mut url, &[("Ids", &comma_separated(item_ids))]);
        self.post("add_to_playlist", &url, None).await
    }

    async fn remove_from_playlist(&self, playlist_id: &str, entry_ids: &[String]) -> ApiResult<()> {
        let mut url = self.url(&format!("{API_PLAYLISTS}/{playlist_id}/Items/Delete"));
        Self::push_params(&mut url, &[("EntryIds", &comma_separated(entry_ids))]);
        self.post("remove_from_playlist", &url, None).await
    }

    async fn move_in_playlist(
        &self,
        playlist_id: &str,
        entry_id: &str,
        new_index: u32,
    ) -> ApiResult<()> {
        let url = self.url(&format!(
            "{API_PLAYLISTS}/{playlist_id}/Items/{entry_id}/Move/{new_index}"
        ));
        self.post("move_in_playlist", &url, None).await
    }

    async fn watched_status(&self, user_id: &str, item_id: &str) -> ApiResult<bool> {
        let url = self.url(&format!("{API_USERS}/{user_id}/Items/{item_id}"));
        let item: EmbyItem = self.get_json("watched_status", &url).await?;
        Ok(item.user_data.map(|data| data.played).unwrap_or(false))
    }

    async fn set_watched(&self, user_id: &str, item_id: &str) -> ApiResult<()> {
        let url = self.url(&format!("{API_USERS}/{user_id}/PlayedItems/{item_id}"));
        self.post("set_watched", &url, None).await
    }

    async fn play_state(&self, user_id: &str, item_id: &str) -> ApiResult<Option<PlayState>> {
        let url = self.url(&format!("{API_USERS}/{user_id}/Items/{item_id}"));
        let item: EmbyItem = match self.get_json("play_state", &url).await {
            Ok(item) => item,
            Err(ApiError::Status(404, _)) => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(Some(item.into_play_state()))
    }

    async fn set_play_state(
        &self,
        user_id: &str,
        item_id: &str,
        position_ticks: i64,
        last_played_iso: &str,
    ) -> ApiResult<()> {
        let url = self.url(&format!("{API_USERS}/{user_id}/Items/{item_id}/UserData"));
        let body = json!({
            "PlaybackPositionTicks": position_ticks,
            "LastPlayedDate": last_played_iso,
        });
        self.post("set_play_state", &url, Some(body)).await
    }

    async fn trigger_scan(&self, library_id: &str) -> ApiResult<()> {
        let mut url = self.url(&format!("/Items/{library_id}/Refresh"));
        Self::push_params(
            &mut url,
            &[
                ("Recursive", "true"),
                ("ImageRefreshMode", "Default"),
                ("ReplaceAllImages", "false"),
                ("ReplaceAllMetadata", "false"),
            ],
        );
        self.post("trigger_scan", &url, None).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ItemsResponse {
    items: Vec<EmbyItem>,
    #[allow(dead_code)]
    total_record_count: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct EmbyItem {
    id: String,
    name: String,
    #[serde(rename = "Type")]
    item_type: String,
    path: Option<String>,
    series_name: Option<String>,
    parent_index_number: Option<u32>,
    index_number: Option<u32>,
    run_time_ticks: Option<i64>,
    playlist_item_id: Option<String>,
    date_last_saved: Option<String>,
    user_data: Option<EmbyUserData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct EmbyUserData {
    play_count: i64,
    playback_position_ticks: i64,
    played: bool,
    played_percentage: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MediaFolder {
    name: String,
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct SystemInfo {
    server_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EmbyUser {
    id: String,
    name: String,
}

impl EmbyItem {
    fn into_media_item(self) -> MediaItem {
        let kind = MediaKind::from_type_str(&self.item_type);
        let full_title = match (&self.series_name, kind) {
            (Some(series), MediaKind::Episode) => format!("{series} - {}", self.name),
            _ => self.name.clone(),
        };
        MediaItem {
            id: self.id,
            kind,
            title: self.name,
            full_title,
            path: self.path.unwrap_or_default(),
            // One tick is 100 ns, so 10_000 ticks per millisecond.
            duration_ms: self.run_time_ticks.unwrap_or(0) / 10_000,
            watched: self
                .user_data
                .as_ref()
                .map(|data| data.played)
                .unwrap_or(false),
            playback_percent: self
                .user_data
                .as_ref()
                .and_then(|data| data.played_percentage)
                .map(|p| p.round() as i32)
                .unwrap_or(0),
            series_name: self.series_name,
            season_num: self.parent_index_number,
            episode_num: self.index_number,
        }
    }

    fn into_play_state(self) -> PlayState {
        let runtime_ticks = self.run_time_ticks.unwrap_or(0);
        let data = self.user_data.unwrap_or_default();
        let played_percent = data.played_percentage.unwrap_or_else(|| {
            if runtime_ticks > 0 {
                data.playback_position_ticks as f64 * 100.0 / runtime_ticks as f64
            } else {
                0.0
            }
        });
        PlayState {
            path: self.path.unwrap_or_default(),
            played_percent,
            runtime_ticks,
            position_ticks: data.playback_position_ticks,
            play_count: data.play_count,
            played: data.played,
        }
    }
}
