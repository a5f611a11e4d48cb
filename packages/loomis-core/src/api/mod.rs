//! Typed HTTP clients for the upstream media servers and their trackers.
//!
//! Two server families are supported: the Plex family (XML responses,
//! collections) with its Tautulli tracker, and the Emby family (JSON
//! responses, playlists) with its Jellystat tracker. Each client implements
//! a capability trait from [`traits`] so that the synchronizers depend on
//! the seam, not the concrete wire code.
//!
//! Failure policy: operations are not retried here. A non-success response
//! is logged at warning level with the operation name and a body snippet,
//! then surfaced as [`ApiError`] for the caller to treat as "skip this
//! cycle".

pub mod emby;
pub mod error;
pub mod jellystat;
pub mod manager;
pub mod plex;
pub mod tautulli;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use emby::EmbyApi;
pub use error::{check_response, ApiError, ApiResult};
pub use jellystat::JellystatApi;
pub use manager::{ApiManager, EmbyServer, PlexServer};
pub use plex::PlexApi;
pub use tautulli::TautulliApi;
pub use traits::{EmbyClient, JellystatClient, PlexClient, TautulliClient};
pub use types::{
    Collection, CollectionItem, MediaItem, MediaKind, PathMapEntry, PlayState, Playlist,
    PlaylistEntry, SearchBy, User, WatchEvent,
};

use std::sync::LazyLock;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;

/// Connection timeout applied to every upstream request. Total deadlines
/// are the caller's business.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Shared HTTP client for all upstream requests (connection pooling).
static SHARED_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .pool_max_idle_per_host(4)
        .build()
        .expect("failed to build shared HTTP client")
});

/// Returns a handle to the shared HTTP client.
pub(crate) fn http_client() -> Client {
    SHARED_CLIENT.clone()
}

/// Query-parameter encode set: everything except the RFC 3986 unreserved
/// characters (`A-Z a-z 0-9 - _ . ~`) is percent-encoded.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encodes a query-parameter value.
#[must_use]
pub fn encode(value: &str) -> String {
    utf8_percent_encode(value, QUERY_ENCODE_SET).to_string()
}

/// Joins ids into the comma-separated list form the upstream APIs take.
pub(crate) fn comma_separated(ids: &[String]) -> String {
    ids.join(",")
}
