//! The synchronization services scheduled by the service manager.

pub mod playlist_sync;
pub mod watch_sync;

pub use playlist_sync::PlaylistSyncService;
pub use watch_sync::WatchStateSyncService;
