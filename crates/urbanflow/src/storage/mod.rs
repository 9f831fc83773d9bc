//! Persistent local store.
//!
//! A string-keyed, string-valued store backed by a single `SQLite` file. It
//! plays the role of the browser profile's local storage: durable across
//! runs, private to one profile, and visible to every process that opens
//! the same file.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, trace};

use crate::error::{Error, Result};

/// How long a connection waits on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Key/value store shared by every component of one profile.
///
/// Cloning is cheap and clones share one connection.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl LocalStore {
    /// Open or create a local store at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening local store at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // Several processes share the file: WAL lets readers proceed while one writes.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        migrations::initialize_schema(&conn)?;

        info!("Local store opened at {}", path.display());
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("local store connection lock poisoned"))
    }

    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()?
            .query_row("SELECT value FROM entries WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        trace!(key, found = value.is_some(), "local store read");
        Ok(value)
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn()?.execute(
            r"
            INSERT INTO entries (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![key, value, now],
        )?;
        trace!(key, bytes = value.len(), "local store write");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> LocalStore {
        LocalStore::open_in_memory().expect("failed to create test store")
    }

    fn temp_db_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "urbanflow_store_{tag}_{}.db",
            std::process::id()
        ))
    }

    fn cleanup(path: &Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
    }

    #[test]
    fn test_get_missing_key() {
        let store = create_test_store();
        assert_eq!(store.get("nothing").unwrap(), None);
    }

    #[test]
    fn test_set_and_get() {
        let store = create_test_store();
        store.set("theme", "dark").unwrap();
        assert_eq!(store.get("theme").unwrap().as_deref(), Some("dark"));
    }

    #[test]
    fn test_set_overwrites() {
        let store = create_test_store();
        store.set("theme", "dark").unwrap();
        store.set("theme", "light").unwrap();

        assert_eq!(store.get("theme").unwrap().as_deref(), Some("light"));
    }

    #[test]
    fn test_clone_shares_connection() {
        let store = create_test_store();
        let other = store.clone();
        store.set("shared", "yes").unwrap();

        assert_eq!(other.get("shared").unwrap().as_deref(), Some("yes"));
    }

    #[test]
    fn test_unicode_value() {
        let store = create_test_store();
        store.set("title", "Tıxac – Nizami küç.").unwrap();
        assert_eq!(
            store.get("title").unwrap().as_deref(),
            Some("Tıxac – Nizami küç.")
        );
    }

    #[test]
    fn test_path_in_memory() {
        assert_eq!(create_test_store().path().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_two_handles_on_one_file_see_each_other() {
        let path = temp_db_path("shared");
        cleanup(&path);

        let first = LocalStore::open(&path).unwrap();
        let second = LocalStore::open(&path).unwrap();
        first.set("urbanflow_refresh", "1").unwrap();

        assert_eq!(
            second.get("urbanflow_refresh").unwrap().as_deref(),
            Some("1")
        );

        drop(first);
        drop(second);
        cleanup(&path);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let root = std::env::temp_dir().join(format!("urbanflow_nested_{}", std::process::id()));
        let nested_path = root.join("profile/local.db");
        let _ = std::fs::remove_dir_all(&root);

        let store = LocalStore::open(&nested_path).unwrap();
        assert!(nested_path.exists());
        assert_eq!(store.path(), nested_path);

        drop(store);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_data_survives_reopen() {
        let path = temp_db_path("reopen");
        cleanup(&path);

        {
            let store = LocalStore::open(&path).unwrap();
            store.set("persisted", "yes").unwrap();
        }
        let store = LocalStore::open(&path).unwrap();
        assert_eq!(store.get("persisted").unwrap().as_deref(), Some("yes"));

        drop(store);
        cleanup(&path);
    }
}
