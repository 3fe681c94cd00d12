//! Versioned local database.
//!
//! One SQLite database holds the three collections. The schema is created on
//! first open and stamped with `PRAGMA user_version`.
//!
//! # Schema (version 1)
//!
//! | Table | Key | Indices |
//! |-------|-----|---------|
//! | `sync_queue` | `id` autoincrement | `timestamp`, `kind`, `(status, synced_at)` |
//! | `cache` | `key` | `expires_at` |
//! | `drafts` | `id` = `<kind>_<entity_id>` | `kind`, `updated_at` |
//!
//! # Execution
//!
//! The connection lives behind a mutex and every operation runs on tokio's
//! blocking pool through [`Database::call`], so callers never block the
//! async executor. Each call is one statement or one transaction.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Schema version written to `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Schema for version 1.
const SCHEMA_V1: &str = "
    CREATE TABLE IF NOT EXISTS sync_queue (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      kind TEXT NOT NULL,
      payload TEXT NOT NULL,
      timestamp INTEGER NOT NULL,
      status TEXT NOT NULL CHECK (status IN ('pending', 'synced')),
      synced_at INTEGER
    );
    CREATE INDEX IF NOT EXISTS sync_queue_timestamp ON sync_queue (timestamp);
    CREATE INDEX IF NOT EXISTS sync_queue_kind ON sync_queue (kind);
    CREATE INDEX IF NOT EXISTS sync_queue_status ON sync_queue (status, synced_at);

    CREATE TABLE IF NOT EXISTS cache (
      key TEXT PRIMARY KEY,
      value TEXT NOT NULL,
      expires_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS cache_expires_at ON cache (expires_at);

    CREATE TABLE IF NOT EXISTS drafts (
      id TEXT PRIMARY KEY,
      kind TEXT NOT NULL,
      entity_id TEXT NOT NULL,
      data TEXT NOT NULL,
      updated_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS drafts_kind ON drafts (kind);
    CREATE INDEX IF NOT EXISTS drafts_updated_at ON drafts (updated_at);
";

// ============================================================================
// Database
// ============================================================================

/// Shared handle to the local SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Opens (or creates) the database file at `path`.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the parent directory cannot be created
    /// - [`Error::Sqlite`] if the file cannot be opened or initialised
    /// - [`Error::Storage`] if the file has a newer schema version
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(&path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            ",
        )?;
        migrate(&mut conn)?;

        debug!(path = %path.display(), "Local store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sqlite`] if initialisation fails.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrate(&mut conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Database file path, `None` for in-memory.
    #[inline]
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Runs `f` against the connection on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or [`Error::Storage`] if the blocking
    /// task panicked or was cancelled.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::storage(format!("Storage task failed: {e}")))?
    }

    /// Reads `PRAGMA user_version`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sqlite`] if the pragma cannot be read.
    pub async fn schema_version(&self) -> Result<i64> {
        self.call(|conn| Ok(user_version(conn)?)).await
    }
}

// ============================================================================
// Migration
// ============================================================================

fn user_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Brings the schema up to [`SCHEMA_VERSION`].
fn migrate(conn: &mut Connection) -> Result<()> {
    let version = user_version(conn)?;

    if version > SCHEMA_VERSION {
        return Err(Error::storage(format!(
            "Database schema version {version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    if version < SCHEMA_VERSION {
        let tx = conn.transaction()?;
        tx.execute_batch(SCHEMA_V1)?;
        tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        tx.commit()?;

        info!(from = version, to = SCHEMA_VERSION, "Local store schema upgraded");
    }

    Ok(())
}

// ============================================================================
// Row Helpers
// ============================================================================

/// Decodes a JSON text column.
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_schema_version() {
        let db = Database::open_in_memory().expect("open");
        assert_eq!(db.schema_version().await.expect("version"), SCHEMA_VERSION);
        assert!(db.path().is_none());
    }

    #[tokio::test]
    async fn test_tables_and_indices_exist() {
        let db = Database::open_in_memory().expect("open");

        let names: Vec<String> = db
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type IN ('table', 'index') ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
            })
            .await
            .expect("list schema");

        for expected in [
            "sync_queue",
            "sync_queue_timestamp",
            "sync_queue_kind",
            "sync_queue_status",
            "cache",
            "cache_expires_at",
            "drafts",
            "drafts_kind",
            "drafts_updated_at",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn test_reopen_file_keeps_data() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("store.db");

        {
            let db = Database::open(&path, Duration::from_secs(1)).expect("open");
            db.call(|conn| {
                conn.execute(
                    "INSERT INTO cache (key, value, expires_at) VALUES ('k', '1', 10)",
                    [],
                )?;
                Ok(())
            })
            .await
            .expect("insert");
        }

        let db = Database::open(&path, Duration::from_secs(1)).expect("reopen");
        let count: i64 = db
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM cache", [], |r| r.get(0))?))
            .await
            .expect("count");
        assert_eq!(count, 1);
        assert_eq!(db.path(), Some(path.as_path()));
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("future.db");

        {
            let conn = Connection::open(&path).expect("raw open");
            conn.execute_batch("PRAGMA user_version = 99;").expect("stamp");
        }

        let err = Database::open(&path, Duration::from_secs(1)).unwrap_err();
        assert!(err.is_storage_error());
    }

    #[tokio::test]
    async fn test_call_propagates_sql_errors() {
        let db = Database::open_in_memory().expect("open");
        let err = db
            .call(|conn| {
                conn.execute("INSERT INTO no_such_table VALUES (1)", [])?;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Sqlite(_)));
    }
}
