//! Output formatting for syncq.
//!
//! Queue contents, status and drain results render either as colored text
//! or as JSON.

mod json;
mod pretty;

use crate::cli::args::OutputFormat;
use crate::error::SyncqError;
use crate::queue::{DrainReport, QueueStats, QueuedAction};

pub use json::*;
pub use pretty::*;

/// Format queued actions based on output format
///
/// # Errors
///
/// Returns `SyncqError::Parse` if JSON serialization fails.
pub fn format_actions(actions: &[QueuedAction], format: OutputFormat) -> Result<String, SyncqError> {
    match format {
        OutputFormat::Pretty => Ok(format_actions_pretty(actions)),
        OutputFormat::Json => format_actions_json(actions),
    }
}

/// Format queue status based on output format
///
/// # Errors
///
/// Returns `SyncqError::Parse` if JSON serialization fails.
pub fn format_stats(
    stats: &QueueStats,
    backend: &str,
    format: OutputFormat,
) -> Result<String, SyncqError> {
    match format {
        OutputFormat::Pretty => Ok(format_stats_pretty(stats, backend)),
        OutputFormat::Json => format_stats_json(stats, backend),
    }
}

/// Format a drain result based on output format
///
/// # Errors
///
/// Returns `SyncqError::Parse` if JSON serialization fails.
pub fn format_drain(report: Option<&DrainReport>, format: OutputFormat) -> Result<String, SyncqError> {
    match format {
        OutputFormat::Pretty => Ok(format_drain_pretty(report)),
        OutputFormat::Json => format_drain_json(report),
    }
}
