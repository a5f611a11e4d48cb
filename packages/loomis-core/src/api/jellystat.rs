//! Jellystat client — the Emby family's activity tracker.
//!
//! Authenticates with an `x-api-token` header. History events carry only
//! the item identity and activity timestamp; watched state and progress
//! are resolved against the media server afterwards.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::error::{check_response, ApiError, ApiResult};
use super::traits::JellystatClient;
use super::types::WatchEvent;
use super::http_client;

const API_BASE: &str = "/api";
const API_GET_CONFIG: &str = "/getconfig";
const API_USER_HISTORY: &str = "/getUserHistory";

const API_TOKEN_HEADER: &str = "x-api-token";

/// Jellystat HTTP client.
pub struct JellystatApi {
    base_url: String,
    api_key: String,
    client: Client,
}

impl JellystatApi {
    /// Creates a client for one tracker (reuses the shared connection pool).
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: http_client(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_BASE, path)
    }
}

#[async_trait]
impl JellystatClient for JellystatApi {
    async fn ping(&self) -> bool {
        let url = self.url(API_GET_CONFIG);
        match self
            .client
            .get(&url)
            .header(API_TOKEN_HEADER, &self.api_key)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn watch_history(&self, user_id: &str) -> ApiResult<Vec<WatchEvent>> {
        let url = self.url(API_USER_HISTORY);
        let response = self
            .client
            .post(&url)
            .header(API_TOKEN_HEADER, &self.api_key)
            .json(&json!({ "userid": user_id }))
            .send()
            .await
            .map_err(|err| {
                log::warn!("[Jellystat] watch_history request failed: {err}");
                ApiError::from(err)
            })?;
        match check_response(response).await {
            Ok(ok) => {
                let history: UserHistory =
                    serde_json::from_str(&ok.text().await?).map_err(|err| {
                        log::warn!("[Jellystat] watch_history returned an undecodable body: {err}");
                        ApiError::Decode(err.to_string())
                    })?;
                Ok(history
                    .results
                    .into_iter()
                    .map(HistoryRow::into_event)
                    .collect())
            }
            Err(err) => {
                log::warn!("[Jellystat] watch_history {err}");
                Err(err)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserHistory {
    results: Vec<HistoryRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HistoryRow {
    #[serde(rename = "NowPlayingItemName")]
    name: String,
    #[serde(rename = "NowPlayingItemId")]
    id: String,
    #[serde(rename = "ActivityDateInserted")]
    watched_at: String,
    #[serde(rename = "SeriesName")]
    series_name: Option<String>,
    #[serde(rename = "EpisodeId")]
    episode_id: Option<String>,
}

impl HistoryRow {
    fn into_event(self) -> WatchEvent {
        // Watched state and percentage come from the media server's play
        // state later; the tracker only knows the activity happened.
        WatchEvent {
            item_id: self.id,
            full_title: self.name,
            watched: false,
            playback_percent: 0,
            watched_at: self.watched_at,
            series_name: self.series_name.filter(|s| !s.is_empty()),
            episode_id: self.episode_id.filter(|s| !s.is_empty()),
        }
    }
}
