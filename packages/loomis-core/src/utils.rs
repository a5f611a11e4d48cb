//! General utilities shared across the engine.

use std::time::Duration;

use chrono::{Local, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Formats epoch seconds as an ISO-8601 UTC timestamp (`2024-06-01T12:00:00Z`).
///
/// Out-of-range values clamp to the epoch rather than panicking.
#[must_use]
pub fn iso_from_epoch_seconds(secs: i64) -> String {
    let ts = Utc
        .timestamp_opt(secs, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap_or_default());
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Returns the ISO-8601 UTC timestamp `days` ago, used as a history cutoff.
///
/// ISO-8601 strings of this shape compare lexically in chronological order,
/// so the cutoff can be applied with plain string comparison.
#[must_use]
pub fn history_cutoff_iso(days: i64) -> String {
    (Utc::now() - chrono::Duration::days(days))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

/// Returns the local calendar date `days` ago as `YYYY-MM-DD`.
///
/// The Plex-family tracker takes its history window as a local date.
#[must_use]
pub fn history_date_local(days: i64) -> String {
    (Local::now() - chrono::Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

/// Checks whether a string has the ISO-8601 timestamp shape
/// (`YYYY-MM-DDTHH:MM:SS` prefix, anything after).
///
/// The path-map staleness probe compares date-modified stamps lexically,
/// which only equals chronological order for strings of this shape. Stamps
/// that fail this check are ignored rather than trusted.
#[must_use]
pub fn is_iso_stamp(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() < 19 {
        return false;
    }
    let digit = |i: usize| b[i].is_ascii_digit();
    digit(0)
        && digit(1)
        && digit(2)
        && digit(3)
        && b[4] == b'-'
        && digit(5)
        && digit(6)
        && b[7] == b'-'
        && digit(8)
        && digit(9)
        && b[10] == b'T'
        && digit(11)
        && digit(12)
        && b[13] == b':'
        && digit(14)
        && digit(15)
        && b[16] == b':'
        && digit(17)
        && digit(18)
}

// ─────────────────────────────────────────────────────────────────────────────
// Path Rewriting
// ─────────────────────────────────────────────────────────────────────────────

/// Rewrites a file path from one server's media root to another's.
///
/// If `full_path` does not start with `old_root` it is returned unchanged;
/// the caller's lookup will simply miss and the event is skipped.
#[must_use]
pub fn rewrite_media_path(full_path: &str, old_root: &str, new_root: &str) -> String {
    match full_path.strip_prefix(old_root) {
        Some(rest) => format!("{new_root}{rest}"),
        None => full_path.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pacing
// ─────────────────────────────────────────────────────────────────────────────

/// Sleeps for `duration` unless shutdown is requested first.
///
/// Returns `false` when the sleep was interrupted by shutdown, so task
/// bodies can return early from their pacing intervals.
pub async fn pace(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
