//! `SQLite` connection behind [`SqliteBackend`](super::SqliteBackend).

use std::path::Path;

use rusqlite::Connection;

use crate::error::SyncqError;

use super::migrations;

/// Migrated connection holding the `kv_store` table.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database file at `path` in WAL mode, creating and migrating
    /// it as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, SyncqError> {
        let conn = Connection::open(path).map_err(|e| {
            SyncqError::Database(format!("Failed to open database {}: {e}", path.display()))
        })?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| SyncqError::Database(format!("Failed to enable WAL: {e}")))?;
        Self::migrated(conn)
    }

    /// Throwaway in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self, SyncqError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SyncqError::Database(format!("Failed to open in-memory database: {e}")))?;
        Self::migrated(conn)
    }

    fn migrated(conn: Connection) -> Result<Self, SyncqError> {
        migrations::run(&conn)?;
        Ok(Self { conn })
    }

    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_is_migrated() {
        let db = Database::in_memory().unwrap();
        assert_eq!(migrations::get_version(db.conn()).unwrap(), 1);
    }

    #[test]
    fn test_open_creates_file_in_wal_mode() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("queue.db");

        let db = Database::open(&db_path).unwrap();
        let mode: String = db
            .conn()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
        assert!(db_path.exists());
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("queue.db");

        {
            let db = Database::open(&db_path).unwrap();
            db.conn()
                .execute(
                    "INSERT INTO kv_store (key, value, updated_at) VALUES ('k', x'00', 'now')",
                    [],
                )
                .unwrap();
        }

        let db = Database::open(&db_path).unwrap();
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM kv_store", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
