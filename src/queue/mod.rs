//! Offline action queue.
//!
//! Actions produced while offline are persisted through a [`QueueStore`],
//! ordered by priority class, and replayed through a [`DispatchTable`] once
//! the remote is reachable again. Failed attempts back off exponentially
//! in a [`RetryScheduler`] until the retry budget is spent.
//!
//! Components:
//! - [`action`]: the queued action and its priority classes
//! - [`store`]: durable load/save of the whole queue
//! - [`retry`]: backoff policy and timer heap
//! - [`dispatch`]: action type to remote operation
//! - [`processor`]: the drain loop and public queue API
//! - [`connectivity`]: reachability changes to pause/resume
//! - [`notify`]: per-pass summaries

pub mod action;
pub mod connectivity;
pub mod dispatch;
pub mod notify;
pub mod processor;
pub mod retry;
pub mod store;

pub use action::{ActionType, QueuedAction, UNKNOWN_PRIORITY};
pub use connectivity::{BackgroundSync, Connectivity, ConnectivityMonitor};
pub use dispatch::{DispatchTable, FnRemote, RemoteOperation};
pub use notify::{DrainReport, Notifier, NotifyLevel, TracingNotifier};
pub use processor::{
    EnqueueOptions, ProcessorOptions, ProcessorState, QueueProcessor, QueueStats, DEFAULT_SYNC_TAG,
};
pub use retry::{RetryDecision, RetryPolicy, RetryScheduler};
pub use store::{QueueStore, DEFAULT_STORAGE_KEY};
