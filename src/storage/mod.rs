//! Storage layer for syncq.
//!
//! The queue is persisted through a [`KvBackend`]. The default stack is a
//! SQLite table as the primary backend with a directory of plain files as
//! the fallback, combined by [`FallbackBackend`].

mod backend;
mod database;
mod fallback;
mod migrations;

use std::sync::Arc;

pub use backend::{FileBackend, KvBackend, MemoryBackend, SqliteBackend};
pub use database::Database;
pub use fallback::FallbackBackend;

use crate::config::Paths;

/// Build the default SQLite-with-file-fallback backend under `paths`.
///
/// If the database cannot be opened at all the file backend is used alone.
#[must_use]
pub fn default_backend(paths: &Paths) -> Arc<dyn KvBackend> {
    let fallback: Arc<dyn KvBackend> = Arc::new(FileBackend::new(&paths.kv_dir));
    match SqliteBackend::open(&paths.database) {
        Ok(primary) => Arc::new(FallbackBackend::new(Arc::new(primary), fallback)),
        Err(e) => {
            tracing::warn!(error = %e, "sqlite backend unavailable, using file backend only");
            Arc::new(FallbackBackend::without_primary(fallback))
        }
    }
}
