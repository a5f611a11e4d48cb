//! Path-to-item-id map for one Emby-family server.
//!
//! Synchronizers translate file paths produced by one server into item ids
//! known to another. Asking the target server to resolve every path would
//! be one request per item; instead each Emby server gets a map built from
//! a full library dump once per cycle, serving lookups in O(1).
//!
//! # Concurrency design
//!
//! The published map is an `Arc<HashMap>` behind a `RwLock`: rebuilds
//! construct a scratch map off-lock and replace the whole value, so readers
//! never observe a partially populated map. Lookups copy one `String` out
//! under the read guard; no lock is held across I/O.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::api::EmbyClient;
use crate::error::LoomisResult;
use crate::scheduler::{CronJob, Task};
use crate::utils::is_iso_stamp;

/// Quick staleness probe, every five minutes at second 30.
const CRON_QUICK_CHECK: &str = "30 */5 * * * *";
/// Unconditional rebuild, daily at 03:45:00.
const CRON_FULL_REBUILD: &str = "0 45 3 * * *";

#[derive(Default)]
struct PathMapState {
    map: Arc<HashMap<String, String>>,
    /// Lexicographic max of the ISO date-modified stamps seen during the
    /// last successful rebuild. Non-decreasing across rebuilds.
    last_stamp: String,
}

/// Owns and refreshes the `path → id` mapping for one Emby-family server.
pub struct PathMapRefresher {
    server_name: String,
    api: Arc<dyn EmbyClient>,
    state: RwLock<PathMapState>,
}

impl PathMapRefresher {
    pub fn new(server_name: impl Into<String>, api: Arc<dyn EmbyClient>) -> Arc<Self> {
        Arc::new(Self {
            server_name: server_name.into(),
            api,
            state: RwLock::new(PathMapState::default()),
        })
    }

    /// Resolves a path to the server's item id.
    #[must_use]
    pub fn id_of(&self, path: &str) -> Option<String> {
        self.state.read().map.get(path).cloned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().map.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().map.len()
    }

    #[must_use]
    pub fn last_stamp(&self) -> String {
        self.state.read().last_stamp.clone()
    }

    /// Cheap staleness probe: fetch the single most recently modified item
    /// and rebuild only when its stamp is newer than the last rebuild's
    /// (or when nothing is published yet).
    pub async fn quick_check(&self) -> LoomisResult<()> {
        let needs_rebuild = {
            let state = self.state.read();
            state.map.is_empty()
        } || match self.api.latest_change_stamp().await? {
            Some(stamp) => stamp > self.state.read().last_stamp,
            None => false,
        };

        if needs_rebuild {
            self.rebuild().await?;
        } else {
            log::trace!("[PathMap] {} unchanged, skipping rebuild", self.server_name);
        }
        Ok(())
    }

    /// Full rebuild from a library dump, swapped in atomically.
    pub async fn rebuild(&self) -> LoomisResult<()> {
        let entries = self.api.path_map_snapshot().await?;

        let mut scratch: HashMap<String, String> = HashMap::with_capacity(entries.len());
        let mut max_stamp = String::new();
        for entry in entries {
            if entry.id.is_empty() || entry.path.is_empty() {
                continue;
            }
            // Duplicate paths keep the first id seen; server responses are
            // ordered, so this is deterministic.
            scratch.entry(entry.path).or_insert(entry.id);

            // Only ISO-shaped stamps participate in the staleness probe;
            // lexical comparison is chronological for that shape alone.
            if is_iso_stamp(&entry.date_modified) && entry.date_modified > max_stamp {
                max_stamp = entry.date_modified;
            }
        }

        // A transient empty response must not wipe a populated map.
        if scratch.is_empty() {
            log::warn!(
                "[PathMap] {} returned an empty snapshot, keeping previous map",
                self.server_name
            );
            return Ok(());
        }

        let count = scratch.len();
        {
            let mut state = self.state.write();
            state.map = Arc::new(scratch);
            if max_stamp > state.last_stamp {
                state.last_stamp = max_stamp;
            }
        }
        log::info!("[PathMap] {} rebuilt with {count} items", self.server_name);
        Ok(())
    }

    /// The two scheduler tasks that keep this map fresh.
    #[must_use]
    pub fn tasks(self: &Arc<Self>) -> Vec<Task> {
        vec![
            Task::new(
                format!("Path Map Check ({})", self.server_name),
                CRON_QUICK_CHECK,
                Arc::new(QuickCheckJob(Arc::clone(self))),
            ),
            Task::new(
                format!("Path Map Rebuild ({})", self.server_name),
                CRON_FULL_REBUILD,
                Arc::new(RebuildJob(Arc::clone(self))),
            ),
        ]
    }
}

struct QuickCheckJob(Arc<PathMapRefresher>);

#[async_trait]
impl CronJob for QuickCheckJob {
    async fn run(&self, _shutdown: &CancellationToken) -> LoomisResult<()> {
        self.0.quick_check().await
    }
}

struct RebuildJob(Arc<PathMapRefresher>);

#[async_trait]
impl CronJob for RebuildJob {
    async fn run(&self, _shutdown: &CancellationToken) -> LoomisResult<()> {
        self.0.rebuild().await
    }
}
