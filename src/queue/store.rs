//! Durable queue store.
//!
//! Serialises the whole action list under one key. Neither direction ever
//! fails upward: a missing or corrupt queue loads as empty, and a write that
//! every backend refuses leaves the in-memory queue authoritative.
//!
//! Several processes can share one queue. [`QueueStore::update`] re-reads
//! the stored list and writes the merged result while holding an exclusive
//! lock on the store's lock file, so writers never overwrite each other.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;

use super::action::{sort_actions, QueuedAction};
use crate::storage::KvBackend;

/// Default key the queue is stored under.
pub const DEFAULT_STORAGE_KEY: &str = "offline_queue";

/// Load/replace access to the persisted queue.
#[derive(Clone)]
pub struct QueueStore {
    backend: Arc<dyn KvBackend>,
    key: String,
    lock_file: Option<PathBuf>,
}

impl QueueStore {
    /// Store the queue under `key` in `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn KvBackend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            lock_file: None,
        }
    }

    /// Store the queue under [`DEFAULT_STORAGE_KEY`].
    #[must_use]
    pub fn with_default_key(backend: Arc<dyn KvBackend>) -> Self {
        Self::new(backend, DEFAULT_STORAGE_KEY)
    }

    /// Serialise [`update`](Self::update) across processes with an
    /// exclusive lock on `path`.
    #[must_use]
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    /// Read the persisted actions, sorted by priority then age.
    pub async fn load(&self) -> Vec<QueuedAction> {
        self.read().await.unwrap_or_default()
    }

    /// Like [`load`](Self::load), but `None` when the stored queue could not
    /// be read or parsed, as opposed to simply being empty.
    pub async fn read(&self) -> Option<Vec<QueuedAction>> {
        let bytes = match self.backend.get(&self.key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Some(Vec::new()),
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), error = %e, "queue load failed");
                return None;
            }
        };

        match serde_json::from_slice::<Vec<QueuedAction>>(&bytes) {
            Ok(mut actions) => {
                sort_actions(&mut actions);
                Some(actions)
            }
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), error = %e, "persisted queue is corrupt, starting empty");
                None
            }
        }
    }

    /// Replace the persisted actions. Returns `false` if nothing was written.
    pub async fn save(&self, actions: &[QueuedAction]) -> bool {
        let bytes = match serde_json::to_vec(actions) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "queue serialisation failed");
                return false;
            }
        };

        match self.backend.set(&self.key, &bytes).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    backend = self.backend.name(),
                    count = actions.len(),
                    error = %e,
                    "queue not persisted, durability lost until next successful write"
                );
                false
            }
        }
    }

    /// Read the stored queue, let `merge` build the list to keep, and save
    /// it, all under the lock file. `merge` gets `None` when the stored
    /// queue is unreadable.
    pub async fn update<F>(&self, merge: F) -> bool
    where
        F: FnOnce(Option<Vec<QueuedAction>>) -> Vec<QueuedAction> + Send,
    {
        let _guard = self.lock().await;
        let merged = merge(self.read().await);
        self.save(&merged).await
    }

    /// Take the lock file. Without one, or when it cannot be taken, the
    /// update runs unlocked.
    async fn lock(&self) -> Option<File> {
        let path = self.lock_file.clone()?;
        let locked = tokio::task::spawn_blocking(move || lock_exclusive(&path)).await;
        match locked {
            Ok(Ok(file)) => Some(file),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "queue lock unavailable, writing unlocked");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "queue lock task failed, writing unlocked");
                None
            }
        }
    }
}

/// Blocks until no other handle holds the lock. Dropping the file unlocks.
fn lock_exclusive(path: &Path) -> std::io::Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.lock_exclusive()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ActionType;
    use crate::storage::{FallbackBackend, MemoryBackend};
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn action(t: ActionType, offset: i64) -> QueuedAction {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        QueuedAction::new(t, json!({"n": offset}), base + Duration::seconds(offset))
    }

    #[tokio::test]
    async fn test_empty_store_loads_nothing() {
        let store = QueueStore::with_default_key(Arc::new(MemoryBackend::new()));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_preserves_retries_and_timestamps() {
        let backend = Arc::new(MemoryBackend::new());
        let store = QueueStore::with_default_key(backend.clone());

        let mut retried = action(ActionType::SendMessage, 2);
        retried.retries = 3;
        let actions = vec![action(ActionType::CheckIn, 1), retried];

        assert!(store.save(&actions).await);

        let reopened = QueueStore::with_default_key(backend);
        assert_eq!(reopened.load().await, actions);
    }

    #[tokio::test]
    async fn test_corrupt_queue_loads_empty() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set(DEFAULT_STORAGE_KEY, b"{not json").await.unwrap();

        let store = QueueStore::with_default_key(backend);
        assert!(store.load().await.is_empty());
        assert_eq!(store.read().await, None);
    }

    #[tokio::test]
    async fn test_unsorted_data_is_sorted_on_load() {
        let backend = Arc::new(MemoryBackend::new());
        let store = QueueStore::with_default_key(backend);

        let report = action(ActionType::SubmitReport, 0);
        let alert = action(ActionType::EmergencyAlert, 10);
        store.save(&[report.clone(), alert.clone()]).await;

        let loaded = store.load().await;
        assert_eq!(loaded[0].id, alert.id);
        assert_eq!(loaded[1].id, report.id);
    }

    #[tokio::test]
    async fn test_total_backend_failure_is_swallowed() {
        let primary = Arc::new(MemoryBackend::new());
        let fallback = Arc::new(MemoryBackend::new());
        primary.set_available(false);
        fallback.set_available(false);
        let store = QueueStore::with_default_key(Arc::new(FallbackBackend::new(primary, fallback)));

        assert!(!store.save(&[action(ActionType::CheckIn, 0)]).await);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_with_stored_queue() {
        let backend = Arc::new(MemoryBackend::new());
        let store = QueueStore::with_default_key(backend.clone());
        let theirs = action(ActionType::EmergencyAlert, 0);
        store.save(std::slice::from_ref(&theirs)).await;

        let mine = action(ActionType::CheckIn, 1);
        let saved = store
            .update(|stored| {
                let mut merged = stored.unwrap_or_default();
                merged.push(mine.clone());
                merged
            })
            .await;

        assert!(saved);
        assert_eq!(store.load().await, vec![theirs, mine]);
    }

    #[tokio::test]
    async fn test_concurrent_locked_updates_keep_every_write() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = Arc::new(MemoryBackend::new());
        let store = QueueStore::with_default_key(backend).with_lock_file(dir.path().join("queue.lock"));

        let mut tasks = Vec::new();
        for n in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .update(|stored| {
                        let mut merged = stored.unwrap_or_default();
                        merged.push(action(ActionType::SendMessage, n));
                        merged
                    })
                    .await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }

        assert_eq!(store.load().await.len(), 8);
        assert!(dir.path().join("queue.lock").exists());
    }

    #[tokio::test]
    async fn test_unusable_lock_file_still_writes() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = QueueStore::with_default_key(Arc::new(MemoryBackend::new()))
            .with_lock_file(dir.path().join("missing").join("queue.lock"));

        assert!(store.update(|_| vec![action(ActionType::CheckIn, 0)]).await);
        assert_eq!(store.load().await.len(), 1);
    }
}
