//! Aggregate drain results and the sink they are reported to.

use serde::Serialize;

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    /// Everything went through
    Success,
    /// Nothing noteworthy failed
    Info,
    /// Some actions were dropped
    Warning,
    /// Nothing went through and some actions were dropped
    Error,
}

/// Receives one summary per drain pass.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Show `message` to the user.
    fn notify(&self, message: &str, level: NotifyLevel);
}

/// Notifier that writes summaries to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, level: NotifyLevel) {
        match level {
            NotifyLevel::Success | NotifyLevel::Info => tracing::info!(%message, "sync"),
            NotifyLevel::Warning | NotifyLevel::Error => tracing::warn!(%message, "sync"),
        }
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Actions the remote accepted.
    pub succeeded: usize,
    /// Actions dropped for good during this pass.
    pub failed: usize,
    /// Failures handed back to the retry scheduler.
    pub retried: usize,
    /// Actions still queued or in backoff when the pass ended.
    pub pending: usize,
    /// IDs of the dropped actions.
    pub failed_ids: Vec<String>,
}

impl DrainReport {
    /// Whether the pass attempted anything at all.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.succeeded + self.failed + self.retried
    }

    /// Severity to report this pass with.
    #[must_use]
    pub const fn level(&self) -> NotifyLevel {
        if self.failed > 0 && self.succeeded == 0 {
            NotifyLevel::Error
        } else if self.failed > 0 {
            NotifyLevel::Warning
        } else if self.succeeded > 0 {
            NotifyLevel::Success
        } else {
            NotifyLevel::Info
        }
    }

    /// One-line summary for a toast.
    #[must_use]
    pub fn message(&self) -> String {
        let mut parts = Vec::new();
        if self.succeeded > 0 {
            parts.push(format!("Synced {}", plural(self.succeeded, "action")));
        }
        if self.failed > 0 {
            parts.push(format!("{} failed", plural(self.failed, "action")));
        }
        if self.pending > 0 {
            parts.push(format!("{} still pending", self.pending));
        }
        if parts.is_empty() {
            return "Nothing to sync".to_string();
        }
        parts.join(", ")
    }
}

fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}
