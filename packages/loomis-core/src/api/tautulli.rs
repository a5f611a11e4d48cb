//! Tautulli client — the Plex family's activity tracker.
//!
//! Single `/api/v2` endpoint with a `cmd` selector; responses arrive in a
//! `{response: {result, data}}` envelope. History timestamps are epoch
//! seconds and get converted to ISO-8601 once, here at the edge, so the
//! synchronizer can compare all event times lexically.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::error::{check_response, ApiError, ApiResult};
use super::traits::TautulliClient;
use super::types::{User, WatchEvent};
use super::{encode, http_client};
use crate::utils::iso_from_epoch_seconds;

const API_BASE: &str = "/api/v2";

/// Largest history page requested per cycle; the consolidation step
/// collapses it to one event per item anyway.
const HISTORY_PAGE_LENGTH: u32 = 1000;

/// Tautulli HTTP client.
pub struct TautulliApi {
    base_url: String,
    api_key: String,
    client: Client,
}

impl TautulliApi {
    /// Creates a client for one tracker (reuses the shared connection pool).
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: http_client(),
        }
    }

    fn url(&self, cmd: &str) -> String {
        format!(
            "{}{}?apikey={}&cmd={}",
            self.base_url, API_BASE, self.api_key, cmd
        )
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
    ) -> ApiResult<T> {
        let response = self.client.get(url).send().await.map_err(|err| {
            log::warn!("[Tautulli] {operation} request failed: {err}");
            ApiError::from(err)
        })?;
        match check_response(response).await {
            Ok(ok) => {
                let envelope: Envelope<T> = serde_json::from_str(&ok.text().await?)
                    .map_err(|err| {
                        log::warn!("[Tautulli] {operation} returned an undecodable body: {err}");
                        ApiError::Decode(err.to_string())
                    })?;
                Ok(envelope.response.data)
            }
            Err(err) => {
                log::warn!("[Tautulli] {operation} {err}");
                Err(err)
            }
        }
    }
}

#[async_trait]
impl TautulliClient for TautulliApi {
    async fn ping(&self) -> bool {
        let url = self.url("status");
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn user_info(&self, name: &str) -> ApiResult<Option<User>> {
        let users: Vec<TautulliUser> = self.get_data("user_info", &self.url("get_users")).await?;
        Ok(users
            .into_iter()
            .find(|user| user.username == name || user.friendly_name == name)
            .map(TautulliUser::into_user))
    }

    async fn watch_history(
        &self,
        user_name: &str,
        after_date: &str,
    ) -> ApiResult<Vec<WatchEvent>> {
        let mut url = self.url("get_history");
        url.push_str(&format!(
            "&user={}&after={}&length={HISTORY_PAGE_LENGTH}",
            encode(user_name),
            encode(after_date),
        ));
        let data: HistoryData = self.get_data("watch_history", &url).await?;
        Ok(data.data.into_iter().map(HistoryItem::into_event).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: ResponseBody<T>,
}

#[derive(Debug, Deserialize)]
struct ResponseBody<T> {
    data: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TautulliUser {
    user_id: i64,
    username: String,
    friendly_name: String,
}

impl TautulliUser {
    fn into_user(self) -> User {
        let name = if self.friendly_name.is_empty() {
            self.username
        } else {
            self.friendly_name
        };
        User {
            id: self.user_id.to_string(),
            name,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HistoryData {
    data: Vec<HistoryItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HistoryItem {
    rating_key: i64,
    full_title: String,
    /// 0 = unwatched, 0.5 = partial, 1 = watched.
    watched_status: f64,
    percent_complete: i64,
    /// Epoch seconds when playback stopped.
    stopped: i64,
    grandparent_title: String,
}

impl HistoryItem {
    fn into_event(self) -> WatchEvent {
        WatchEvent {
            item_id: self.rating_key.to_string(),
            full_title: self.full_title,
            watched: self.watched_status >= 1.0,
            playback_percent: self.percent_complete as i32,
            watched_at: iso_from_epoch_seconds(self.stopped),
            series_name: if self.grandparent_title.is_empty() {
                None
            } else {
                Some(self.grandparent_title)
            },
            episode_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_key_and_cmd() {
        let api = TautulliApi::new("http://tautulli.local:8181", "abc");
        assert_eq!(
            api.url("get_users"),
            "http://tautulli.local:8181/api/v2?apikey=abc&cmd=get_users"
        );
    }

    #[test]
    fn envelope_unwraps_data() {
        let json = r#"{"response": {"result": "success", "data": [
            {"user_id": 5, "username": "alex", "friendly_name": "Alex"}
        ]}}"#;
        let envelope: Envelope<Vec<TautulliUser>> = serde_json::from_str(json).unwrap();
        let users = envelope.response.data;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, 5);
    }

    #[test]
    fn user_prefers_friendly_name() {
        let user = TautulliUser {
            user_id: 5,
            username: "alex".into(),
            friendly_name: "Alex".into(),
        };
        let user = user.into_user();
        assert_eq!(user.id, "5");
        assert_eq!(user.name, "Alex");

        let bare = TautulliUser {
            user_id: 6,
            username: "sam".into(),
            friendly_name: String::new(),
        };
        assert_eq!(bare.into_user().name, "sam");
    }

    #[test]
    fn history_item_converts_to_event() {
        let json = r#"{
            "rating_key": 4711,
            "full_title": "The Show - Pilot",
            "watched_status": 1,
            "percent_complete": 98,
            "stopped": 1717243200,
            "grandparent_title": "The Show"
        }"#;
        let item: HistoryItem = serde_json::from_str(json).unwrap();
        let event = item.into_event();
        assert_eq!(event.item_id, "4711");
        assert!(event.watched);
        assert_eq!(event.playback_percent, 98);
        assert_eq!(event.watched_at, "2024-06-01T12:00:00Z");
        assert_eq!(event.series_name.as_deref(), Some("The Show"));
        assert!(event.episode_id.is_none());
    }

    #[test]
    fn partial_watch_status_is_not_watched() {
        let item = HistoryItem {
            rating_key: 1,
            watched_status: 0.5,
            percent_complete: 42,
            ..Default::default()
        };
        let event = item.into_event();
        assert!(!event.watched);
        assert_eq!(event.playback_percent, 42);
    }

    #[test]
    fn missing_history_fields_default() {
        let data: HistoryData = serde_json::from_str(r#"{"data": [{"rating_key": 9}]}"#).unwrap();
        assert_eq!(data.data.len(), 1);
        let event = data.data.into_iter().next().unwrap().into_event();
        assert_eq!(event.item_id, "9");
        assert!(!event.watched);
    }
}
