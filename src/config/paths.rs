//! Path resolution for syncq configuration and data files.
//!
//! All syncq data is stored in `~/.syncq/`:
//! - `config.yaml` - Main configuration file
//! - `syncq.db` - SQLite database, the primary queue backend
//! - `kv/` - Plain files, the fallback queue backend
//! - `queue.lock` - Held while a process rewrites the queue

use std::path::PathBuf;

use crate::error::SyncqError;

/// Paths to syncq configuration and data directories.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.syncq/`
    pub root: PathBuf,
    /// Config file: `~/.syncq/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.syncq/syncq.db`
    pub database: PathBuf,
    /// Fallback key-value directory: `~/.syncq/kv/`
    pub kv_dir: PathBuf,
    /// Queue writer lock: `~/.syncq/queue.lock`
    pub lock_file: PathBuf,
}

impl Paths {
    /// Create paths based on the user's home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, SyncqError> {
        let home = std::env::var("HOME")
            .map_err(|_| SyncqError::Config("Could not determine home directory".to_string()))?;

        Ok(Self::with_root(PathBuf::from(home).join(".syncq")))
    }

    /// Create paths with a custom root directory (useful for testing).
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("syncq.db"),
            kv_dir: root.join("kv"),
            lock_file: root.join("queue.lock"),
            root,
        }
    }

    /// Ensure all directories exist, creating them if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), SyncqError> {
        for dir in [&self.root, &self.kv_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    SyncqError::Config(format!("Failed to create directory {}: {e}", dir.display()))
                })?;
            }
        }

        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self::with_root(PathBuf::from(".syncq")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_with_root() {
        let root = PathBuf::from("/tmp/test-syncq");
        let paths = Paths::with_root(root.clone());

        assert_eq!(paths.root, root);
        assert_eq!(paths.config_file, root.join("config.yaml"));
        assert_eq!(paths.database, root.join("syncq.db"));
        assert_eq!(paths.kv_dir, root.join("kv"));
        assert_eq!(paths.lock_file, root.join("queue.lock"));
    }

    #[test]
    fn test_ensure_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().join("nested"));

        paths.ensure_dirs().unwrap();

        assert!(paths.root.exists());
        assert!(paths.kv_dir.exists());
    }
}
