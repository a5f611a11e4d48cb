//! Centralized error types for the Loomis core library.

use thiserror::Error;

use crate::api::ApiError;

/// Application-wide error type for the Loomis engine.
///
/// Transport, protocol, decode, and semantic failures from the upstream
/// clients arrive here as [`ApiError`]. Inside a scheduled task these are
/// "skip this cycle" conditions: the scheduler logs them and the next cron
/// fire retries the whole operation.
#[derive(Debug, Error)]
pub enum LoomisError {
    /// An upstream server operation failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A configuration entry is unusable (bad cron, unknown server, ...).
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenient Result alias for engine operations.
pub type LoomisResult<T> = Result<T, LoomisError>;
