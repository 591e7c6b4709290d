//! Key-value backends the queue is persisted through.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::error::SyncqError;

/// Byte-oriented storage keyed by string.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Read the value stored under `key`, or `None` if there is none.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SyncqError>;

    /// Replace the value stored under `key`.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), SyncqError>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), SyncqError>;
}

/// Structured backend on top of the `kv_store` table.
///
/// Every statement runs on tokio's blocking pool so a slow fsync never
/// stalls the runtime.
pub struct SqliteBackend {
    db: Arc<Mutex<Database>>,
}

impl SqliteBackend {
    /// Wrap an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Open (and migrate) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, SyncqError> {
        Ok(Self::new(Database::open(path)?))
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T, SyncqError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, SyncqError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let db = db.lock().unwrap_or_else(PoisonError::into_inner);
            f(&db)
        })
        .await
        .map_err(|e| SyncqError::Database(format!("sqlite task failed: {e}")))?
    }
}

#[async_trait]
impl KvBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SyncqError> {
        let key = key.to_string();
        self.with_db(move |db| {
            db.conn()
                .query_row("SELECT value FROM kv_store WHERE key = ?1", [&key], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(|e| SyncqError::Database(format!("Failed to read {key}: {e}")))
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), SyncqError> {
        let key = key.to_string();
        let value = value.to_vec();
        self.with_db(move |db| {
            db.conn()
                .execute(
                    r"INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                      ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                     updated_at = excluded.updated_at",
                    params![key, value, Utc::now().to_rfc3339()],
                )
                .map_err(|e| SyncqError::Database(format!("Failed to write {key}: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), SyncqError> {
        let key = key.to_string();
        self.with_db(move |db| {
            db.conn()
                .execute("DELETE FROM kv_store WHERE key = ?1", [&key])
                .map_err(|e| SyncqError::Database(format!("Failed to delete {key}: {e}")))?;
            Ok(())
        })
        .await
    }
}

/// Simple backend storing one file per key.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Use `dir` for storage. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, SyncqError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(SyncqError::Storage(format!("Invalid storage key: {key:?}")));
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl KvBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SyncqError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), SyncqError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Rename is atomic, so readers see either the old or the new queue
        let tmp = self.dir.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SyncqError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process backend. Can be switched off to simulate an unavailable store.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    available: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty, available backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Make every subsequent call succeed (`true`) or fail (`false`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), SyncqError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncqError::Storage("memory backend unavailable".to_string()))
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SyncqError> {
        self.check()?;
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), SyncqError> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SyncqError> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}
