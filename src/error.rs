//! Error types for syncq.

use thiserror::Error;

use crate::queue::ActionType;

/// Errors produced by the queue, its storage, and its configuration.
#[derive(Debug, Error)]
pub enum SyncqError {
    /// SQLite failure.
    #[error("database error: {0}")]
    Database(String),

    /// Configuration could not be read or is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A queued action or other entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Every storage backend refused an operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// Remote client could not be constructed.
    #[error("remote error: {0}")]
    Remote(String),
}

/// Typed failure returned by a remote operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Transient failure (timeout, server error); the action is retried.
    #[error("retryable: {0}")]
    Retryable(String),

    /// The remote rejected the action; retrying cannot help.
    #[error("rejected: {0}")]
    Terminal(String),

    /// The action type is not known to this build.
    #[error("unknown action type: {0}")]
    UnknownType(String),

    /// The action type is known but nothing is registered for it.
    #[error("no remote operation registered for {0}")]
    Unregistered(ActionType),
}

impl DispatchError {
    /// Whether this failure ends the action's life without further retries.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Retryable(_))
    }
}
