//! Service manager: wires configuration, clients, services, and the
//! scheduler together and owns process-lifetime shutdown coordination.

use std::future::Future;

use crate::api::ApiManager;
use crate::config::Config;
use crate::scheduler::CronScheduler;
use crate::services::{PlaylistSyncService, WatchStateSyncService};

/// Builds the enabled services and runs the scheduler until shutdown.
pub struct ServiceManager {
    scheduler: CronScheduler,
}

impl ServiceManager {
    /// Connects to every configured server and registers the enabled
    /// services' tasks plus the path-map refresh tasks.
    pub async fn build(config: &Config) -> Self {
        let api = ApiManager::connect(config).await;
        let mut scheduler = CronScheduler::new();
        let mut service_count = 0;

        if config.playlist_sync.enabled {
            let service = PlaylistSyncService::new(&config.playlist_sync, &api).await;
            if service.pair_count() > 0 {
                scheduler.add(service.task());
                service_count += 1;
            } else {
                log::warn!("playlist sync is enabled but has no usable entries");
            }
        }

        if config.watch_state_sync.enabled {
            let service = WatchStateSyncService::new(&config.watch_state_sync, &api).await;
            if service.group_count() > 0 {
                scheduler.add(service.task());
                service_count += 1;
            } else {
                log::warn!("watch state sync is enabled but has no usable user groups");
            }
        }

        // Path maps only serve the synchronizers; without any service
        // there is nothing to keep fresh.
        if service_count > 0 {
            for task in api.path_map_tasks() {
                scheduler.add(task);
            }
        }

        Self { scheduler }
    }

    /// Number of registered scheduler tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.scheduler.task_count()
    }

    /// Starts the scheduler and parks until `shutdown` resolves, then
    /// stops the scheduler, waiting for any in-flight task.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        if !self.scheduler.start() {
            log::warn!("no services are enabled in the configuration");
            return;
        }

        shutdown.await;
        log::info!("shutdown request received");
        self.scheduler.shutdown().await;
        log::info!("run has completed");
    }
}
