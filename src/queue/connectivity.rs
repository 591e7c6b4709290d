//! Connectivity monitor.
//!
//! Turns reachability changes from the host into `pause()`/`resume()` calls
//! on a [`QueueProcessor`].

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::processor::QueueProcessor;
use crate::error::SyncqError;

/// Network reachability as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// The remote service can be reached.
    Reachable,
    /// No route to the remote service.
    Unreachable,
}

impl Connectivity {
    /// Whether this state allows dispatching.
    #[must_use]
    pub const fn is_reachable(self) -> bool {
        matches!(self, Self::Reachable)
    }
}

impl From<bool> for Connectivity {
    fn from(reachable: bool) -> Self {
        if reachable {
            Self::Reachable
        } else {
            Self::Unreachable
        }
    }
}

/// Host facility that finishes a sync even when the app is backgrounded.
///
/// Registration is best effort; failures are logged and ignored.
#[async_trait]
pub trait BackgroundSync: Send + Sync {
    /// Ask the host to run a sync identified by `tag`.
    async fn register(&self, tag: &str) -> Result<(), SyncqError>;
}

/// Task forwarding connectivity changes to a processor.
pub struct ConnectivityMonitor {
    task: JoinHandle<()>,
}

impl ConnectivityMonitor {
    /// Watch `signal` and drive `processor` from it.
    ///
    /// The current value of `signal` is applied immediately if it disagrees
    /// with the processor's notion of reachability.
    #[must_use]
    pub fn spawn(processor: QueueProcessor, mut signal: watch::Receiver<Connectivity>) -> Self {
        let task = tokio::spawn(async move {
            let mut last = Connectivity::from(processor.is_reachable());
            loop {
                let current = *signal.borrow_and_update();
                if current != last {
                    last = current;
                    match current {
                        Connectivity::Reachable => {
                            let _ = processor.resume().await;
                        }
                        Connectivity::Unreachable => processor.pause().await,
                    }
                }
                if signal.changed().await.is_err() {
                    break;
                }
            }
            tracing::debug!("connectivity source closed");
        });

        Self { task }
    }

    /// Stop forwarding changes.
    pub fn stop(self) {
        self.task.abort();
    }
}
