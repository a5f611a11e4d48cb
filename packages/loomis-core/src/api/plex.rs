//! Plex-family server client.
//!
//! This module handles the token-authenticated HTTP transport and XML
//! response parsing for one Plex-family server. The server speaks XML
//! (`MediaContainer` documents); parsing is a forward-only event walk, with
//! malformed documents degrading to empty results rather than panics.

use std::collections::HashMap;

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use reqwest::Client;

use super::error::{check_response, ApiError, ApiResult};
use super::traits::PlexClient;
use super::types::{Collection, CollectionItem, MediaItem, MediaKind};
use super::{comma_separated, encode, http_client};

const API_SERVERS: &str = "/servers";
const API_SECTIONS: &str = "/library/sections/";
const API_METADATA: &str = "/library/metadata/";
const API_SEARCH: &str = "/search";

/// Plex item-type discriminator for collections in a sections query.
const SEARCH_TYPE_COLLECTION: u32 = 18;

/// Plex-family HTTP client.
pub struct PlexApi {
    base_url: String,
    token: String,
    client: Client,
}

impl PlexApi {
    /// Creates a client for one server (reuses the shared connection pool).
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            client: http_client(),
        }
    }

    /// Builds a token-authenticated URL for an API path.
    fn url(&self, path: &str) -> String {
        format!("{}{}?X-Plex-Token={}", self.base_url, path, self.token)
    }

    /// Appends already-encoded query parameters.
    fn push_params(url: &mut String, params: &[(&str, &str)]) {
        for (key, value) in params {
            url.push_str(&format!("&{key}={value}"));
        }
    }

    /// Issues a GET and returns the body, logging non-success at warning.
    async fn get_body(&self, operation: &'static str, url: &str) -> ApiResult<String> {
        let response = self.client.get(url).send().await.map_err(|err| {
            log::warn!("[Plex] {operation} request failed: {err}");
            ApiError::from(err)
        })?;
        match check_response(response).await {
            Ok(ok) => Ok(ok.text().await?),
            Err(err) => {
                log::warn!("[Plex] {operation} {err}");
                Err(err)
            }
        }
    }

    /// Fire-and-check GET for mutating endpoints (Plex mutates via GET).
    async fn get_ok(&self, operation: &'static str, url: &str) -> ApiResult<()> {
        self.get_body(operation, url).await.map(|_| ())
    }

    /// Resolves a collection's children key within a library.
    async fn collection_key(&self, library: &str, name: &str) -> ApiResult<Option<String>> {
        let Some(library_id) = self.library_id(library).await? else {
            return Ok(None);
        };
        let mut url = self.url(&format!("{API_SECTIONS}{library_id}/all"));
        let type_param = SEARCH_TYPE_COLLECTION.to_string();
        Self::push_params(&mut url, &[("type", &type_param)]);
        let body = self.get_body("collection_key", &url).await?;
        Ok(directory_key_by_title(&body, name))
    }
}

#[async_trait]
impl PlexClient for PlexApi {
    async fn ping(&self) -> bool {
        let url = self.url(API_SERVERS);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn server_reported_name(&self) -> ApiResult<String> {
        let body = self.get_body("server_reported_name", &self.url(API_SERVERS)).await?;
        parse_server_name(&body).ok_or(ApiError::Missing("server name"))
    }

    async fn library_id(&self, library: &str) -> ApiResult<Option<String>> {
        let body = self.get_body("library_id", &self.url(API_SECTIONS)).await?;
        Ok(directory_key_by_title(&body, library))
    }

    async fn collection(&self, library: &str, name: &str) -> ApiResult<Option<Collection>> {
        let Some(key) = self.collection_key(library, name).await? else {
            return Ok(None);
        };
        let body = self.get_body("collection", &self.url(&key)).await?;
        let items = parse_video_nodes(&body)
            .into_iter()
            .map(|node| CollectionItem {
                title: node.title,
                paths: node.paths,
            })
            .collect();
        Ok(Some(Collection {
            name: name.to_string(),
            items,
        }))
    }

    async fn item_paths_by_ids(&self, ids: &[String]) -> ApiResult<HashMap<String, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let url = self.url(&format!("{API_METADATA}{}", comma_separated(ids)));
        let body = self.get_body("item_paths_by_ids", &url).await?;
        Ok(parse_video_nodes(&body)
            .into_iter()
            .filter_map(|node| {
                let path = node.paths.into_iter().next()?;
                Some((node.rating_key, path))
            })
            .collect())
    }

    async fn search_title(&self, query: &str) -> ApiResult<Vec<MediaItem>> {
        let mut url = self.url(API_SEARCH);
        Self::push_params(&mut url, &[("query", &encode(query))]);
        let body = self.get_body("search_title", &url).await?;
        Ok(parse_video_nodes(&body)
            .into_iter()
            .map(VideoNode::into_media_item)
            .collect())
    }

    async fn mark_watched(&self, id: &str) -> ApiResult<()> {
        let mut url = self.url("/:/scrobble");
        Self::push_params(
            &mut url,
            &[("key", &encode(id)), ("identifier", "com.plexapp.plugins.library")],
        );
        self.get_ok("mark_watched", &url).await
    }

    async fn set_position(&self, id: &str, position_ms: i64) -> ApiResult<()> {
        let mut url = self.url("/:/progress");
        let time = position_ms.to_string();
        Self::push_params(
            &mut url,
            &[
                ("key", &encode(id)),
                ("identifier", "com.plexapp.plugins.library"),
                ("time", &time),
                ("state", "stopped"),
            ],
        );
        self.get_ok("set_position", &url).await
    }

    async fn trigger_scan(&self, library_id: &str) -> ApiResult<()> {
        let url = self.url(&format!("{API_SECTIONS}{library_id}/refresh"));
        self.get_ok("trigger_scan", &url).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// XML Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Reads one attribute of an element as an owned string.
fn xml_attr(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// One `Video` (or item `Directory`) element with its `Part` file paths.
#[derive(Debug, Default)]
struct VideoNode {
    rating_key: String,
    title: String,
    item_type: String,
    duration_ms: i64,
    view_count: i64,
    view_offset_ms: i64,
    grandparent_title: Option<String>,
    parent_index: Option<u32>,
    index: Option<u32>,
    paths: Vec<String>,
}

impl VideoNode {
    fn from_element(element: &BytesStart<'_>) -> Self {
        Self {
            rating_key: xml_attr(element, b"ratingKey").unwrap_or_default(),
            title: xml_attr(element, b"title").unwrap_or_default(),
            item_type: xml_attr(element, b"type").unwrap_or_default(),
            duration_ms: xml_attr(element, b"duration")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            view_count: xml_attr(element, b"viewCount")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            view_offset_ms: xml_attr(element, b"viewOffset")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            grandparent_title: xml_attr(element, b"grandparentTitle").filter(|t| !t.is_empty()),
            parent_index: xml_attr(element, b"parentIndex").and_then(|v| v.parse().ok()),
            index: xml_attr(element, b"index").and_then(|v| v.parse().ok()),
            paths: Vec::new(),
        }
    }

    fn into_media_item(self) -> MediaItem {
        let kind = MediaKind::from_type_str(&self.item_type);
        let full_title = match (&self.grandparent_title, kind) {
            (Some(series), MediaKind::Episode) => format!("{series} - {}", self.title),
            _ => self.title.clone(),
        };
        let playback_percent = if self.duration_ms > 0 {
            (self.view_offset_ms * 100 / self.duration_ms) as i32
        } else {
            0
        };
        MediaItem {
            id: self.rating_key,
            kind,
            title: self.title,
            full_title,
            path: self.paths.into_iter().next().unwrap_or_default(),
            duration_ms: self.duration_ms,
            watched: self.view_count > 0,
            playback_percent,
            series_name: self.grandparent_title,
            season_num: self.parent_index,
            episode_num: self.index,
        }
    }
}

/// Walks a `MediaContainer` and collects every `Video` with its parts.
fn parse_video_nodes(xml: &str) -> Vec<VideoNode> {
    let mut nodes = Vec::new();
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut current: Option<VideoNode> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"Video" => {
                current = Some(VideoNode::from_element(e));
            }
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"Video" => {
                nodes.push(VideoNode::from_element(e));
            }
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.name().as_ref() == b"Part" =>
            {
                if let (Some(node), Some(file)) = (current.as_mut(), xml_attr(e, b"file")) {
                    node.paths.push(file);
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Video" => {
                if let Some(node) = current.take() {
                    nodes.push(node);
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                log::warn!("[Plex] XML parse error: {err}");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    nodes
}

/// Finds the `key` attribute of the `Directory` whose `title` matches.
fn directory_key_by_title(xml: &str, title: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.name().as_ref() == b"Directory" =>
            {
                if xml_attr(e, b"title").as_deref() == Some(title) {
                    return xml_attr(e, b"key");
                }
            }
            Ok(Event::Eof) => return None,
            Err(err) => {
                log::warn!("[Plex] XML parse error: {err}");
                return None;
            }
            _ => {}
        }
        buf.clear();
    }
}

/// Extracts the reported server name from a `/servers` response.
fn parse_server_name(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.name().as_ref() == b"Server" =>
            {
                return xml_attr(e, b"name");
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}
