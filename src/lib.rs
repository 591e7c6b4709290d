//! syncq - offline action queue and synchronization engine
//!
//! Actions recorded while the remote is unreachable are persisted, ordered
//! by priority class, and replayed through typed remote operations once
//! connectivity returns, with exponential backoff for transient failures.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod output;
pub mod queue;
pub mod remote;
pub mod storage;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::{DispatchError, SyncqError};
pub use queue::{ActionType, DispatchTable, QueueProcessor, QueuedAction};
pub use remote::HttpRemote;
