//! Collection→playlist synchronizer.
//!
//! For each configured (source collection, target servers) entry, makes
//! every target's playlist of the same name match the collection's ordered
//! membership. Membership is fixed first (batch add + batch remove, then
//! one settle-and-refetch), then order, with an online selection sort that
//! issues at most one move per displaced entry. A failed target never
//! aborts the others; the next cron fire re-runs the whole cycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::api::types::{Collection, Playlist, PlaylistEntry};
use crate::api::{ApiManager, EmbyServer, PlexServer};
use crate::config::PlaylistSyncConfig;
use crate::error::LoomisResult;
use crate::scheduler::{CronJob, Task};
use crate::utils::pace;

/// Delay after each successful move; the server commits moves
/// asynchronously and faster calls can land out of order.
const MOVE_PACE: Duration = Duration::from_millis(200);

struct SyncPair {
    plex: Arc<PlexServer>,
    library: String,
    collection_name: String,
    targets: Vec<Arc<EmbyServer>>,
}

/// The collection→playlist sync service (one scheduler task).
pub struct PlaylistSyncService {
    pairs: Vec<SyncPair>,
    settle: Duration,
    between: Duration,
    cron: String,
}

impl PlaylistSyncService {
    /// Validates the configured entries against the registry. Bad entries
    /// are dropped with a warning; the rest proceed.
    pub async fn new(config: &PlaylistSyncConfig, api: &ApiManager) -> Arc<Self> {
        let mut pairs = Vec::new();

        for entry in &config.plex_collection_sync {
            let Some(plex) = api.plex(&entry.server) else {
                log::warn!(
                    "[PlaylistSync] no Plex server named {:?}, skipping collection {:?}",
                    entry.server,
                    entry.collection_name
                );
                continue;
            };

            // Only verify the collection when the server answers; a flaky
            // server keeps its entry and is retried every cycle.
            if plex.api.ping().await {
                match plex
                    .api
                    .collection(&entry.library, &entry.collection_name)
                    .await
                {
                    Ok(None) => {
                        log::warn!(
                            "[PlaylistSync] Plex({}) library {:?} has no collection {:?}, skipping",
                            plex.name,
                            entry.library,
                            entry.collection_name
                        );
                        continue;
                    }
                    Ok(Some(_)) | Err(_) => {}
                }
            }

            let mut targets = Vec::new();
            for target in &entry.target_emby_servers {
                match api.emby(&target.server) {
                    Some(emby) => targets.push(emby),
                    None => log::warn!(
                        "[PlaylistSync] no Emby server named {:?} for collection {:?}",
                        target.server,
                        entry.collection_name
                    ),
                }
            }

            if targets.is_empty() {
                log::warn!(
                    "[PlaylistSync] collection {:?} has no Emby servers to sync, skipping",
                    entry.collection_name
                );
                continue;
            }

            pairs.push(SyncPair {
                plex,
                library: entry.library.clone(),
                collection_name: entry.collection_name.clone(),
                targets,
            });
        }

        Arc::new(Self {
            pairs,
            settle: Duration::from_secs(config.time_for_emby_to_update_seconds),
            between: Duration::from_secs(config.time_between_syncs_seconds),
            cron: config.cron.clone(),
        })
    }

    /// The scheduler task driving this service.
    #[must_use]
    pub fn task(self: &Arc<Self>) -> Task {
        Task::new(
            "Playlist Sync",
            self.cron.clone(),
            Arc::clone(self) as Arc<dyn CronJob>,
        )
    }

    /// Number of usable sync entries after validation.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    async fn sync_target(
        &self,
        target: &EmbyServer,
        collection: &Collection,
        shutdown: &CancellationToken,
    ) {
        if target.path_map.is_empty() && !collection.items.is_empty() {
            log::warn!(
                "[PlaylistSync] Emby({}) path map is empty, collection {:?} can not be synced",
                target.name,
                collection.name
            );
            return;
        }

        let desired = resolve_ids(target, collection);

        match target.api.playlist(&collection.name).await {
            Ok(Some(current)) => {
                self.update_playlist(target, current, &desired, shutdown)
                    .await;
            }
            Ok(None) => match target.api.create_playlist(&collection.name, &desired).await {
                Ok(()) => log::info!(
                    "[PlaylistSync] creating playlist {:?} on Emby({}) with {} items",
                    collection.name,
                    target.name,
                    desired.len()
                ),
                Err(err) => log::warn!(
                    "[PlaylistSync] Emby({}) failed to create playlist {:?}: {err}",
                    target.name,
                    collection.name
                ),
            },
            Err(err) => log::warn!(
                "[PlaylistSync] Emby({}) failed to read playlist {:?}: {err}",
                target.name,
                collection.name
            ),
        }
    }

    async fn update_playlist(
        &self,
        target: &EmbyServer,
        mut current: Playlist,
        desired: &[String],
        shutdown: &CancellationToken,
    ) {
        let (add, remove) = membership_diff(&current.entries, desired);
        let (added, removed) = (add.len(), remove.len());

        if !add.is_empty() {
            if let Err(err) = target.api.add_to_playlist(&current.id, &add).await {
                log::warn!(
                    "[PlaylistSync] Emby({}) failed to add {} items to {:?}: {err}",
                    target.name,
                    add.len(),
                    current.name
                );
            }
        }
        if !remove.is_empty() {
            if let Err(err) = target.api.remove_from_playlist(&current.id, &remove).await {
                log::warn!(
                    "[PlaylistSync] Emby({}) failed to remove {} items from {:?}: {err}",
                    target.name,
                    remove.len(),
                    current.name
                );
            }
        }

        // Structural changes need one settle-and-refetch; server-side
        // indexing lags the mutating call.
        if added > 0 || removed > 0 {
            if !pace(self.settle, shutdown).await {
                return;
            }
            match target.api.playlist(&current.name).await {
                Ok(Some(updated)) => current = updated,
                _ => {
                    log::warn!(
                        "[PlaylistSync] Emby({}) failed to re-read playlist {:?} after update",
                        target.name,
                        current.name
                    );
                    return;
                }
            }
        }

        if current.entries.len() != desired.len() {
            log::warn!(
                "[PlaylistSync] Emby({}) playlist {:?} length should be {} but is {}, aborting reorder",
                target.name,
                current.name,
                desired.len(),
                current.entries.len()
            );
            return;
        }

        let reordered = self.reorder(target, &current, desired, shutdown).await;

        if reordered || added > 0 || removed > 0 {
            log::info!(
                "[PlaylistSync] synced collection {:?} to Emby({}): added {added}, removed {removed}, reordered {reordered}",
                current.name,
                target.name,
            );
        }
    }

    /// Online selection sort over a local projection of the playlist.
    ///
    /// One move per displaced entry, so at most `n - 1` move calls. The
    /// projection mirrors each applied move locally, keeping later
    /// searches consistent without refetching.
    async fn reorder(
        &self,
        target: &EmbyServer,
        current: &Playlist,
        desired: &[String],
        shutdown: &CancellationToken,
    ) -> bool {
        let mut virt: Vec<(&str, &str)> = current
            .entries
            .iter()
            .map(|entry| (entry.item_id.as_str(), entry.entry_id.as_str()))
            .collect();

        let mut changed = false;
        for i in 0..desired.len() {
            if virt[i].0 == desired[i] {
                continue;
            }
            let Some(j) = (i + 1..virt.len()).find(|&j| virt[j].0 == desired[i]) else {
                continue;
            };

            match target
                .api
                .move_in_playlist(&current.id, virt[j].1, i as u32)
                .await
            {
                Ok(()) => {
                    let entry = virt.remove(j);
                    virt.insert(i, entry);
                    changed = true;
                    if !pace(MOVE_PACE, shutdown).await {
                        return changed;
                    }
                }
                Err(err) => log::warn!(
                    "[PlaylistSync] Emby({}) failed to move entry in {:?}: {err}",
                    target.name,
                    current.name
                ),
            }
        }
        changed
    }
}

#[async_trait]
impl CronJob for PlaylistSyncService {
    async fn run(&self, shutdown: &CancellationToken) -> LoomisResult<()> {
        for pair in &self.pairs {
            if shutdown.is_cancelled() {
                break;
            }
            if !pair.plex.api.ping().await {
                log::warn!(
                    "[PlaylistSync] Plex({}) is offline, skipping collection {:?} this cycle",
                    pair.plex.name,
                    pair.collection_name
                );
                continue;
            }

            let collection = match pair
                .plex
                .api
                .collection(&pair.library, &pair.collection_name)
                .await
            {
                Ok(Some(collection)) => collection,
                Ok(None) => {
                    log::warn!(
                        "[PlaylistSync] Plex({}) no longer has collection {:?}",
                        pair.plex.name,
                        pair.collection_name
                    );
                    continue;
                }
                Err(err) => {
                    log::warn!(
                        "[PlaylistSync] Plex({}) failed to fetch collection {:?}: {err}",
                        pair.plex.name,
                        pair.collection_name
                    );
                    continue;
                }
            };

            for target in &pair.targets {
                if shutdown.is_cancelled() {
                    return Ok(());
                }
                if !target.api.ping().await {
                    log::warn!(
                        "[PlaylistSync] Emby({}) is offline, skipping this cycle",
                        target.name
                    );
                    continue;
                }
                self.sync_target(target, &collection, shutdown).await;
                if !pace(self.between, shutdown).await {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

/// Resolves the collection's ordered target-side ids through the target's
/// path map. The first candidate path that resolves wins; items with no
/// resolvable path are skipped for this target this cycle.
fn resolve_ids(target: &EmbyServer, collection: &Collection) -> Vec<String> {
    let mut ids = Vec::with_capacity(collection.items.len());
    for item in &collection.items {
        match item.paths.iter().find_map(|path| target.path_map.id_of(path)) {
            Some(id) => ids.push(id),
            None => log::warn!(
                "[PlaylistSync] Emby({}) collection {:?} item {:?} not found",
                target.name,
                collection.name,
                item.title
            ),
        }
    }
    ids
}

/// Splits the membership delta: ids to add (in desired order) and entry
/// ids to remove.
fn membership_diff(current: &[PlaylistEntry], desired: &[String]) -> (Vec<String>, Vec<String>) {
    let add = desired
        .iter()
        .filter(|id| !current.iter().any(|entry| &entry.item_id == *id))
        .cloned()
        .collect();
    let remove = current
        .iter()
        .filter(|entry| !desired.contains(&entry.item_id))
        .map(|entry| entry.entry_id.clone())
        .collect();
    (add, remove)
}
