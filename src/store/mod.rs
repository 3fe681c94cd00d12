//! Local persistence layer.
//!
//! A [`LocalStore`] owns one versioned SQLite database with three
//! collections and hands out cheap handles to each:
//!
//! | Handle | Table | Purpose |
//! |--------|-------|---------|
//! | [`SyncQueue`] | `sync_queue` | Outbound mutations awaiting delivery |
//! | [`Cache`] | `cache` | Values with a time-to-live |
//! | [`DraftStore`] | `drafts` | Unsaved edits keyed by entity |
//!
//! All handles share the same connection and the same [`Clock`].
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use serde_json::json;
//! use tether::{LocalStore, Operation, StoreOptions};
//!
//! let store = LocalStore::open(StoreOptions::at("offline.db"))?;
//!
//! store.queue().add(Operation::new("lead.update", json!({ "id": 42 }))).await?;
//! store.cache().set("profile", &json!({ "name": "acme" }), Duration::from_secs(300)).await?;
//! store.drafts().save("lead", "42", &json!({ "notes": "call back" })).await?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// TTL cache.
pub mod cache;

/// Time source.
pub mod clock;

/// SQLite handle and schema migration.
pub mod database;

/// Draft store.
pub mod drafts;

/// Store options.
pub mod options;

/// Sync queue.
pub mod queue;

/// Timestamp range sweeps.
pub mod sweep;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::info;

use crate::error::{Error, Result};

// ============================================================================
// Re-exports
// ============================================================================

pub use cache::Cache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use database::{Database, SCHEMA_VERSION};
pub use drafts::{DraftItem, DraftStore};
pub use options::StoreOptions;
pub use queue::{Operation, SyncQueue, SyncQueueItem, SyncStatus};
pub use sweep::{Bound, Sweep, SweepAction};

// ============================================================================
// LocalStore
// ============================================================================

/// Entry point to the local database.
///
/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct LocalStore {
    db: Database,
    clock: Arc<dyn Clock>,
    options: StoreOptions,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("db", &self.db)
            .field("options", &self.options)
            .finish()
    }
}

impl LocalStore {
    /// Opens the store described by `options` using wall-clock time.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are invalid
    /// - A storage error if the database cannot be opened or migrated
    pub fn open(options: StoreOptions) -> Result<Self> {
        Self::open_with_clock(options, Arc::new(SystemClock))
    }

    /// Opens the store with an explicit time source.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn open_with_clock(options: StoreOptions, clock: Arc<dyn Clock>) -> Result<Self> {
        options.validate().map_err(Error::config)?;

        let db = match &options.path {
            Some(path) => Database::open(path, options.busy_timeout)?,
            None => Database::open_in_memory()?,
        };

        info!(
            path = ?options.path,
            warn_threshold = ?options.pending_warn_threshold,
            "Local store ready"
        );

        Ok(Self { db, clock, options })
    }

    /// Opens a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns a storage error if initialisation fails.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreOptions::in_memory())
    }

    /// Sync queue handle.
    #[inline]
    #[must_use]
    pub fn queue(&self) -> SyncQueue {
        SyncQueue::new(
            self.db.clone(),
            Arc::clone(&self.clock),
            self.options.pending_warn_threshold,
        )
    }

    /// Cache handle.
    #[inline]
    #[must_use]
    pub fn cache(&self) -> Cache {
        Cache::new(self.db.clone(), Arc::clone(&self.clock))
    }

    /// Draft store handle.
    #[inline]
    #[must_use]
    pub fn drafts(&self) -> DraftStore {
        DraftStore::new(self.db.clone(), Arc::clone(&self.clock))
    }

    /// Schema version of the open database.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the version cannot be read.
    pub async fn schema_version(&self) -> Result<i64> {
        self.db.schema_version().await
    }

    /// Underlying database handle.
    #[inline]
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Options the store was opened with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = LocalStore::open_in_memory().expect("open");
        assert_eq!(store.schema_version().await.expect("version"), SCHEMA_VERSION);
        assert!(store.database().path().is_none());
    }

    #[tokio::test]
    async fn test_handles_share_clock_and_connection() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store =
            LocalStore::open_with_clock(StoreOptions::in_memory(), clock.clone()).expect("open");

        store
            .cache()
            .set("k", &json!("v"), Duration::from_secs(1))
            .await
            .expect("set");
        clock.advance(Duration::from_secs(2));

        let other = store.clone();
        assert_eq!(other.cache().get::<String>("k").await.expect("get"), None);
        assert_eq!(other.cache().keys().await.expect("keys").len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let options = StoreOptions::at(dir.path().join("offline.db"));

        {
            let store = LocalStore::open(options.clone()).expect("open");
            store
                .queue()
                .add(Operation::new("lead.update", json!({ "id": 1 })))
                .await
                .expect("add");
            store.drafts().save("lead", "1", &json!({ "x": 1 })).await.expect("save");
        }

        let store = LocalStore::open(options).expect("reopen");
        assert_eq!(store.queue().pending_count().await.expect("count"), 1);
        assert!(store.drafts().get("lead", "1").await.expect("get").is_some());
    }

    #[test]
    fn test_invalid_options_rejected() {
        let err = LocalStore::open(StoreOptions::in_memory().with_pending_warn_threshold(0))
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
