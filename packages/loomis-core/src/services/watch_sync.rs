//! Watch-state synchronizer.
//!
//! Each configured user-group is one human with accounts on two or more
//! servers. Per cycle, every member's recent history is pulled from its
//! tracker, collapsed to one event per item, resolved to a file path on
//! the source server, and pushed to every peer that is allowed to receive
//! (`can_sync`). Peers that already reflect the state are left untouched,
//! so a repeated cycle issues no mutations.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::api::types::{User, WatchEvent};
use crate::api::{ApiManager, ApiResult, EmbyServer, JellystatClient, PlexServer, TautulliClient};
use crate::config::{UserConfig, WatchStateSyncConfig};
use crate::error::LoomisResult;
use crate::scheduler::{CronJob, Task};
use crate::utils::{history_cutoff_iso, history_date_local, rewrite_media_path};

/// How far back history is considered, in days.
const HISTORY_DAYS: i64 = 1;

/// One state change being propagated from a source user to its peers.
#[derive(Debug, Clone)]
struct StateUpdate {
    /// Absolute path on the source server.
    path: String,
    /// The source server's media root, for rewriting onto peers.
    media_path: String,
    title: String,
    watched: bool,
    percent: i32,
    watched_at: String,
}

/// A group member on a Plex-family server.
struct PlexGroupUser {
    server: Arc<PlexServer>,
    tracker: Arc<dyn TautulliClient>,
    user_name: String,
    can_sync: bool,
    /// Tracker-side identity, re-resolved every cycle; `None` while the
    /// tracker is offline or the account is unknown.
    resolved: Mutex<Option<User>>,
}

impl PlexGroupUser {
    async fn refresh(&self) {
        let resolved = match self.tracker.user_info(&self.user_name).await {
            Ok(user) => user,
            Err(_) => None,
        };
        if resolved.is_none() {
            log::warn!(
                "[WatchSync] Plex({}) user {:?} unavailable this cycle",
                self.server.name,
                self.user_name
            );
        }
        *self.resolved.lock() = resolved;
    }

    fn is_valid(&self) -> bool {
        self.resolved.lock().is_some()
    }

    fn display_name(&self) -> String {
        self.resolved
            .lock()
            .as_ref()
            .map(|user| user.name.clone())
            .unwrap_or_else(|| self.user_name.clone())
    }

    /// Applies an update coming from an Emby-family source. Returns `true`
    /// when a mutation was issued.
    async fn apply(&self, update: &StateUpdate) -> ApiResult<bool> {
        let rewritten =
            rewrite_media_path(&update.path, &update.media_path, &self.server.media_path);
        let results = self.server.api.search_title(&update.title).await?;
        let Some(item) = results.iter().find(|item| item.path == rewritten) else {
            return Ok(false);
        };

        if update.watched {
            if item.watched {
                return Ok(false);
            }
            self.server.api.mark_watched(&item.id).await?;
        } else {
            if item.playback_percent == update.percent {
                return Ok(false);
            }
            let position_ms = item.duration_ms * i64::from(update.percent) / 100;
            self.server.api.set_position(&item.id, position_ms).await?;
        }
        Ok(true)
    }
}

/// A group member on an Emby-family server.
struct EmbyGroupUser {
    server: Arc<EmbyServer>,
    tracker: Arc<dyn JellystatClient>,
    user_name: String,
    can_sync: bool,
    user_id: Mutex<Option<String>>,
}

impl EmbyGroupUser {
    async fn refresh(&self) {
        let resolved = match self.server.api.find_user(&self.user_name).await {
            Ok(Some(user)) => Some(user.id),
            _ => None,
        };
        if resolved.is_none() {
            log::warn!(
                "[WatchSync] Emby({}) user {:?} unavailable this cycle",
                self.server.name,
                self.user_name
            );
        }
        *self.user_id.lock() = resolved;
    }

    fn is_valid(&self) -> bool {
        self.user_id.lock().is_some()
    }

    fn user_id(&self) -> Option<String> {
        self.user_id.lock().clone()
    }

    /// Applies an update whose path is already in this server's namespace
    /// (events from the Plex family; the media roots must agree or the
    /// lookup simply misses).
    async fn apply_direct(&self, update: &StateUpdate) -> ApiResult<bool> {
        let Some(item_id) = self.server.path_map.id_of(&update.path) else {
            return Ok(false);
        };
        self.apply_to_item(&item_id, update).await
    }

    /// Applies an update from another Emby-family server, rewriting the
    /// path between the two media roots first.
    async fn apply_rewritten(&self, update: &StateUpdate) -> ApiResult<bool> {
        let rewritten =
            rewrite_media_path(&update.path, &update.media_path, &self.server.media_path);
        let Some(item_id) = self.server.path_map.id_of(&rewritten) else {
            return Ok(false);
        };
        self.apply_to_item(&item_id, update).await
    }

    async fn apply_to_item(&self, item_id: &str, update: &StateUpdate) -> ApiResult<bool> {
        let Some(user_id) = self.user_id() else {
            return Ok(false);
        };

        if update.watched {
            if self.server.api.watched_status(&user_id, item_id).await? {
                return Ok(false);
            }
            self.server.api.set_watched(&user_id, item_id).await?;
        } else {
            let Some(state) = self.server.api.play_state(&user_id, item_id).await? else {
                return Ok(false);
            };
            if state.played_percent.round() as i32 == update.percent {
                return Ok(false);
            }
            let ticks =
                (state.runtime_ticks as f64 * f64::from(update.percent) / 100.0).round() as i64;
            self.server
                .api
                .set_play_state(&user_id, item_id, ticks, &update.watched_at)
                .await?;
        }
        Ok(true)
    }
}

/// One human across several servers.
struct UserGroup {
    plex: Vec<PlexGroupUser>,
    emby: Vec<EmbyGroupUser>,
}

impl UserGroup {
    async fn sync(&self, shutdown: &CancellationToken) {
        for user in &self.plex {
            user.refresh().await;
        }
        for user in &self.emby {
            user.refresh().await;
        }

        let history_date = history_date_local(HISTORY_DAYS);
        for user in &self.plex {
            if shutdown.is_cancelled() {
                return;
            }
            if !user.is_valid() {
                continue;
            }
            if let Err(err) = self.sync_from_plex(user, &history_date).await {
                log::warn!(
                    "[WatchSync] error syncing Plex({}):{}: {err}",
                    user.server.name,
                    user.user_name
                );
            }
        }
        for user in &self.emby {
            if shutdown.is_cancelled() {
                return;
            }
            if !user.is_valid() {
                continue;
            }
            if let Err(err) = self.sync_from_emby(user).await {
                log::warn!(
                    "[WatchSync] error syncing Emby({}):{}: {err}",
                    user.server.name,
                    user.user_name
                );
            }
        }
    }

    async fn sync_from_plex(&self, source: &PlexGroupUser, date: &str) -> LoomisResult<()> {
        let mut events = source.tracker.watch_history(&source.user_name, date).await?;
        if events.is_empty() {
            return Ok(());
        }
        consolidate(&mut events);

        let ids: Vec<String> = events.iter().map(|event| event.item_id.clone()).collect();
        let paths = source.server.api.item_paths_by_ids(&ids).await?;

        for event in &events {
            // Ids with no resolvable path are dropped.
            let Some(path) = paths.get(&event.item_id) else {
                continue;
            };
            let update = StateUpdate {
                path: path.clone(),
                media_path: source.server.media_path.clone(),
                title: event.full_title.clone(),
                watched: event.watched,
                percent: event.playback_percent,
                watched_at: event.watched_at.clone(),
            };

            let mut destinations = String::new();
            for peer in &self.emby {
                if !peer.can_sync || !peer.is_valid() {
                    continue;
                }
                match peer.apply_direct(&update).await {
                    Ok(true) => push_destination(&mut destinations, "Emby", &peer.server.name),
                    Ok(false) => {}
                    Err(err) => log::warn!(
                        "[WatchSync] Emby({}) failed to apply {:?}: {err}",
                        peer.server.name,
                        update.title
                    ),
                }
            }

            if !destinations.is_empty() {
                log_sync_summary(
                    &format!("Plex({})", source.server.name),
                    &source.display_name(),
                    &update,
                    &destinations,
                );
            }
        }
        Ok(())
    }

    async fn sync_from_emby(&self, source: &EmbyGroupUser) -> LoomisResult<()> {
        let Some(user_id) = source.user_id() else {
            return Ok(());
        };
        let mut events = source.tracker.watch_history(&user_id).await?;
        let cutoff = history_cutoff_iso(HISTORY_DAYS);
        events.retain(|event| event.watched_at >= cutoff);
        consolidate(&mut events);

        for event in &events {
            // For series history the playable item is the episode.
            let play_id = event.episode_id.as_deref().unwrap_or(&event.item_id);
            let state = match source.server.api.play_state(&user_id, play_id).await {
                Ok(Some(state)) => state,
                Ok(None) => continue,
                Err(err) => {
                    log::warn!(
                        "[WatchSync] Emby({}) failed to read play state of {:?}: {err}",
                        source.server.name,
                        event.full_title
                    );
                    continue;
                }
            };

            let update = StateUpdate {
                path: state.path.clone(),
                media_path: source.server.media_path.clone(),
                title: event.full_title.clone(),
                watched: state.played,
                percent: state.played_percent.round() as i32,
                watched_at: event.watched_at.clone(),
            };

            let mut destinations = String::new();
            for peer in &self.plex {
                if !peer.can_sync || !peer.is_valid() {
                    continue;
                }
                match peer.apply(&update).await {
                    Ok(true) => push_destination(&mut destinations, "Plex", &peer.server.name),
                    Ok(false) => {}
                    Err(err) => log::warn!(
                        "[WatchSync] Plex({}) failed to apply {:?}: {err}",
                        peer.server.name,
                        update.title
                    ),
                }
            }
            for peer in &self.emby {
                if peer.server.name == source.server.name {
                    continue;
                }
                if !peer.can_sync || !peer.is_valid() {
                    continue;
                }
                match peer.apply_rewritten(&update).await {
                    Ok(true) => push_destination(&mut destinations, "Emby", &peer.server.name),
                    Ok(false) => {}
                    Err(err) => log::warn!(
                        "[WatchSync] Emby({}) failed to apply {:?}: {err}",
                        peer.server.name,
                        update.title
                    ),
                }
            }

            if !destinations.is_empty() {
                log_sync_summary(
                    &format!("Emby({})", source.server.name),
                    &source.user_name,
                    &update,
                    &destinations,
                );
            }
        }
        Ok(())
    }
}

/// The watch-state sync service (one scheduler task).
pub struct WatchStateSyncService {
    groups: Vec<UserGroup>,
    cron: String,
}

impl WatchStateSyncService {
    /// Builds the user-groups, dropping members whose server or tracker is
    /// not configured. A group needs at least two members to be kept.
    pub async fn new(config: &WatchStateSyncConfig, api: &ApiManager) -> Arc<Self> {
        let mut groups = Vec::new();

        for group_config in &config.users {
            let mut group = UserGroup {
                plex: Vec::new(),
                emby: Vec::new(),
            };

            for user in &group_config.plex {
                if let Some(member) = build_plex_member(user, api) {
                    group.plex.push(member);
                }
            }
            for user in &group_config.emby {
                if let Some(member) = build_emby_member(user, api) {
                    group.emby.push(member);
                }
            }

            // A single-server group has nobody to sync with.
            if group.plex.len() + group.emby.len() >= 2 {
                groups.push(group);
            } else {
                log::warn!("[WatchSync] user group with fewer than two valid users, skipping");
            }
        }

        Arc::new(Self {
            groups,
            cron: config.cron.clone(),
        })
    }

    /// The scheduler task driving this service.
    #[must_use]
    pub fn task(self: &Arc<Self>) -> Task {
        Task::new(
            "Watch State Sync",
            self.cron.clone(),
            Arc::clone(self) as Arc<dyn CronJob>,
        )
    }

    /// Number of active user-groups after validation.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

#[async_trait]
impl CronJob for WatchStateSyncService {
    async fn run(&self, shutdown: &CancellationToken) -> LoomisResult<()> {
        for group in &self.groups {
            if shutdown.is_cancelled() {
                break;
            }
            group.sync(shutdown).await;
        }
        Ok(())
    }
}

fn build_plex_member(user: &UserConfig, api: &ApiManager) -> Option<PlexGroupUser> {
    let Some(server) = api.plex(&user.server) else {
        log::warn!(
            "[WatchSync] no Plex server named {:?} for user {:?}",
            user.server,
            user.user_name
        );
        return None;
    };
    let Some(tracker) = server.tracker.clone() else {
        log::warn!(
            "[WatchSync] Plex({}) has no tracker configured; required for user {:?}",
            server.name,
            user.user_name
        );
        return None;
    };
    Some(PlexGroupUser {
        server,
        tracker,
        user_name: user.user_name.clone(),
        can_sync: user.can_sync,
        resolved: Mutex::new(None),
    })
}

fn build_emby_member(user: &UserConfig, api: &ApiManager) -> Option<EmbyGroupUser> {
    let Some(server) = api.emby(&user.server) else {
        log::warn!(
            "[WatchSync] no Emby server named {:?} for user {:?}",
            user.server,
            user.user_name
        );
        return None;
    };
    let Some(tracker) = server.tracker.clone() else {
        log::warn!(
            "[WatchSync] Emby({}) has no tracker configured; required for user {:?}",
            server.name,
            user.user_name
        );
        return None;
    };
    Some(EmbyGroupUser {
        server,
        tracker,
        user_name: user.user_name.clone(),
        can_sync: user.can_sync,
        user_id: Mutex::new(None),
    })
}

/// Collapses history to the latest event per item.
///
/// Stable order: item id ascending, then timestamp descending, then the
/// first event of each id wins. Idempotent and deterministic.
fn consolidate(events: &mut Vec<WatchEvent>) {
    events.sort_by(|a, b| {
        a.item_id
            .cmp(&b.item_id)
            .then_with(|| b.watched_at.cmp(&a.watched_at))
    });
    events.dedup_by(|later, kept| later.item_id == kept.item_id);
}

fn push_destination(destinations: &mut String, family: &str, server: &str) {
    if !destinations.is_empty() {
        destinations.push_str(", ");
    }
    destinations.push_str(&format!("{family}({server})"));
}

fn log_sync_summary(server: &str, user: &str, update: &StateUpdate, destinations: &str) {
    if update.watched {
        log::info!(
            "{server}:{user} watched {} sync {destinations} watch state",
            update.title
        );
    } else {
        log::info!(
            "{server}:{user} played {}% of {} sync {destinations} play state",
            update.percent,
            update.title
        );
    }
}
