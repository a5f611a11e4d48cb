//! Loomis Core - engine library for the Loomis synchronization daemon.
//!
//! Loomis keeps a Plex-family media server and one or more Emby-family
//! servers (each paired with its activity tracker) in agreement about
//! what each user has watched and about the contents and ordering of
//! curated collections/playlists. The upstream HTTP APIs are the only
//! I/O; all state is in-process and reconstructible from the servers.
//!
//! # Architecture
//!
//! - [`scheduler`]: cron-driven single-worker task scheduler with
//!   cooperative shutdown and per-task fault isolation
//! - [`api`]: capability traits and HTTP clients for the two server
//!   families and their trackers
//! - [`pathmap`]: per-server `path → item-id` map with a quick staleness
//!   probe and atomic whole-map swaps
//! - [`services`]: the collection→playlist and watch-state synchronizers
//! - [`manager`]: wires everything together and coordinates shutdown
//! - [`config`]: parsed configuration consumed by the engine
//! - [`error`]: centralized error types
//!
//! The synchronizers depend on the client traits rather than the concrete
//! HTTP implementations, so every sync algorithm is exercised against
//! in-memory fakes in the test suites.

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod error;
pub mod manager;
pub mod pathmap;
pub mod scheduler;
pub mod services;
pub mod utils;

// Re-export commonly used types at the crate root
pub use api::{
    ApiError, ApiManager, ApiResult, EmbyApi, EmbyClient, EmbyServer, JellystatApi,
    JellystatClient, PlexApi, PlexClient, PlexServer, TautulliApi, TautulliClient,
};
pub use config::Config;
pub use error::{LoomisError, LoomisResult};
pub use manager::ServiceManager;
pub use pathmap::PathMapRefresher;
pub use scheduler::{CronJob, CronScheduler, Task};
pub use services::{PlaylistSyncService, WatchStateSyncService};
