//! JSON output formatting for syncq.

use serde::Serialize;
use serde_json::json;

use crate::error::SyncqError;
use crate::queue::{DrainReport, QueueStats, QueuedAction};

/// Format queued actions as JSON
///
/// # Errors
///
/// Returns `SyncqError::Parse` if JSON serialization fails.
pub fn format_actions_json(actions: &[QueuedAction]) -> Result<String, SyncqError> {
    let output = json!({
        "count": actions.len(),
        "items": actions
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format queue status as JSON
///
/// # Errors
///
/// Returns `SyncqError::Parse` if JSON serialization fails.
pub fn format_stats_json(stats: &QueueStats, backend: &str) -> Result<String, SyncqError> {
    let output = json!({
        "pending": stats.pending,
        "inBackoff": stats.in_backoff,
        "total": stats.pending + stats.in_backoff,
        "oldest": stats.oldest,
        "backend": backend,
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format a drain result as JSON. `None` means nothing was attempted.
///
/// # Errors
///
/// Returns `SyncqError::Parse` if JSON serialization fails.
pub fn format_drain_json(report: Option<&DrainReport>) -> Result<String, SyncqError> {
    let output = match report {
        Some(report) => json!({
            "drained": true,
            "succeeded": report.succeeded,
            "failed": report.failed,
            "retried": report.retried,
            "pending": report.pending,
            "failedIds": report.failed_ids,
            "message": report.message(),
        }),
        None => json!({ "drained": false }),
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Generic JSON formatter for any serializable type
///
/// # Errors
///
/// Returns `SyncqError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, SyncqError> {
    Ok(serde_json::to_string_pretty(value)?)
}
