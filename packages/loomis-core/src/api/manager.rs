//! Registry of configured servers and their clients.
//!
//! Built once at startup from the configuration: every Plex-family and
//! Emby-family server gets its client, its optional tracker client, and
//! (for the Emby family) a path-map refresher. Each server is pinged at
//! construction so connection problems surface in the log immediately;
//! an offline server stays registered and is retried every cycle.

use std::sync::Arc;

use crate::config::{Config, ServerConfig};
use crate::pathmap::PathMapRefresher;
use crate::scheduler::Task;

use super::emby::EmbyApi;
use super::jellystat::JellystatApi;
use super::plex::PlexApi;
use super::tautulli::TautulliApi;
use super::traits::{EmbyClient, JellystatClient, PlexClient, TautulliClient};

/// One configured Plex-family server with its tracker.
pub struct PlexServer {
    pub name: String,
    pub media_path: String,
    pub api: Arc<dyn PlexClient>,
    pub tracker: Option<Arc<dyn TautulliClient>>,
}

/// One configured Emby-family server with its tracker and path map.
pub struct EmbyServer {
    pub name: String,
    pub media_path: String,
    pub api: Arc<dyn EmbyClient>,
    pub tracker: Option<Arc<dyn JellystatClient>>,
    pub path_map: Arc<PathMapRefresher>,
}

/// Holds every configured server bundle, resolvable by name.
pub struct ApiManager {
    plex: Vec<Arc<PlexServer>>,
    emby: Vec<Arc<EmbyServer>>,
}

impl ApiManager {
    /// Builds every configured bundle and logs connection results.
    pub async fn connect(config: &Config) -> Self {
        let mut plex = Vec::with_capacity(config.plex.servers.len());
        for server in &config.plex.servers {
            let api: Arc<dyn PlexClient> = Arc::new(PlexApi::new(&server.url, &server.api_key));
            let tracker = tracker_config(server, "Plex").map(|(url, key)| {
                Arc::new(TautulliApi::new(url, key)) as Arc<dyn TautulliClient>
            });
            if tracker.is_none() {
                log::warn!(
                    "Plex({}) has no tracker configured; some services may not be available",
                    server.name
                );
            }

            if api.ping().await {
                match api.server_reported_name().await {
                    Ok(reported) => {
                        log::info!("Connected to Plex({}) successfully ({reported})", server.name);
                    }
                    Err(_) => log_connection_warning("Plex", server),
                }
            } else {
                log_connection_warning("Plex", server);
            }

            plex.push(Arc::new(PlexServer {
                name: server.name.clone(),
                media_path: server.media_path.clone(),
                api,
                tracker,
            }));
        }

        let mut emby = Vec::with_capacity(config.emby.servers.len());
        for server in &config.emby.servers {
            let api: Arc<dyn EmbyClient> = Arc::new(EmbyApi::new(&server.url, &server.api_key));
            let tracker = tracker_config(server, "Emby").map(|(url, key)| {
                Arc::new(JellystatApi::new(url, key)) as Arc<dyn JellystatClient>
            });
            if tracker.is_none() {
                log::warn!(
                    "Emby({}) has no tracker configured; some services may not be available",
                    server.name
                );
            }

            if api.ping().await {
                match api.server_reported_name().await {
                    Ok(reported) => {
                        log::info!("Connected to Emby({}) successfully ({reported})", server.name);
                    }
                    Err(_) => log_connection_warning("Emby", server),
                }
            } else {
                log_connection_warning("Emby", server);
            }

            let path_map = PathMapRefresher::new(&server.name, Arc::clone(&api));
            emby.push(Arc::new(EmbyServer {
                name: server.name.clone(),
                media_path: server.media_path.clone(),
                api,
                tracker,
                path_map,
            }));
        }

        Self { plex, emby }
    }

    /// Assembles a registry from pre-built bundles (used by tests).
    #[must_use]
    pub fn from_parts(plex: Vec<Arc<PlexServer>>, emby: Vec<Arc<EmbyServer>>) -> Self {
        Self { plex, emby }
    }

    #[must_use]
    pub fn plex(&self, name: &str) -> Option<Arc<PlexServer>> {
        self.plex.iter().find(|s| s.name == name).cloned()
    }

    #[must_use]
    pub fn emby(&self, name: &str) -> Option<Arc<EmbyServer>> {
        self.emby.iter().find(|s| s.name == name).cloned()
    }

    #[must_use]
    pub fn emby_servers(&self) -> &[Arc<EmbyServer>] {
        &self.emby
    }

    #[must_use]
    pub fn plex_servers(&self) -> &[Arc<PlexServer>] {
        &self.plex
    }

    /// Refresh tasks for every Emby server's path map.
    #[must_use]
    pub fn path_map_tasks(&self) -> Vec<Task> {
        self.emby
            .iter()
            .flat_map(|server| server.path_map.tasks())
            .collect()
    }
}

/// Extracts the tracker endpoint if fully configured, warning otherwise.
fn tracker_config<'a>(server: &'a ServerConfig, family: &str) -> Option<(&'a str, &'a str)> {
    match (&server.tracker_url, &server.tracker_api_key) {
        (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
        (None, None) => None,
        _ => {
            log::warn!(
                "{family}({}) tracker_url/tracker_api_key incomplete; tracker disabled",
                server.name
            );
            None
        }
    }
}

fn log_connection_warning(family: &str, server: &ServerConfig) {
    log::warn!(
        "{family}({}) server not available. Is url {} correct?",
        server.name,
        server.url
    );
}
