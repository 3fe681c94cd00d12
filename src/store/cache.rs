//! TTL cache.
//!
//! Expiry is split in two:
//!
//! - **Logical**: `get` ignores rows with `expires_at <= now` without
//!   touching them
//! - **Physical**: `clear_expired` deletes those rows in one sweep

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::error::Result;

use super::clock::{Clock, duration_ms};
use super::database::Database;
use super::sweep::{Bound, Sweep, SweepAction};

// ============================================================================
// Constants
// ============================================================================

/// Rows whose expiry is at or before the cutoff.
const EXPIRY_SWEEP: Sweep = Sweep::new("cache", "expires_at", Bound::Inclusive);

// ============================================================================
// Cache
// ============================================================================

/// Handle to the `cache` collection.
#[derive(Clone)]
pub struct Cache {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").field("db", &self.db).finish()
    }
}

impl Cache {
    pub(crate) fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Stores `value` under `key` for `ttl`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`](crate::Error::Json) if `value` cannot be serialized
    /// - A storage error if the write is rejected
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let raw = serde_json::to_string(value)?;
        let expires_at = self.clock.now_ms().saturating_add(duration_ms(ttl));
        let key = key.to_owned();

        self.db
            .call(move |conn| {
                conn.prepare_cached(
                    "INSERT INTO cache (key, value, expires_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT (key) DO UPDATE
                     SET value = excluded.value, expires_at = excluded.expires_at",
                )?
                .execute(params![key, raw, expires_at])?;
                Ok(())
            })
            .await
    }

    /// Returns the value under `key` if present and not expired.
    ///
    /// An expired row reads as `None` even before it is swept.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`](crate::Error::Json) if the stored value does not fit `T`
    /// - A storage error if the read fails
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let now = self.clock.now_ms();
        let lookup = key.to_owned();

        let raw: Option<String> = self
            .db
            .call(move |conn| {
                let raw = conn
                    .prepare_cached("SELECT value FROM cache WHERE key = ?1 AND expires_at > ?2")?
                    .query_row(params![lookup, now], |row| row.get(0))
                    .optional()?;
                Ok(raw)
            })
            .await?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => {
                trace!(key, "Cache miss");
                Ok(None)
            }
        }
    }

    /// Removes `key` regardless of expiry. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete is rejected.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let key = key.to_owned();

        self.db
            .call(move |conn| {
                let removed = conn
                    .prepare_cached("DELETE FROM cache WHERE key = ?1")?
                    .execute(params![key])?;
                Ok(removed > 0)
            })
            .await
    }

    /// Physically deletes every expired row. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete is rejected.
    pub async fn clear_expired(&self) -> Result<usize> {
        let now = self.clock.now_ms();

        self.db
            .call(move |conn| Ok(EXPIRY_SWEEP.run(conn, now, SweepAction::Delete)?))
            .await
    }

    /// Number of expired rows still on disk.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub async fn stale_count(&self) -> Result<usize> {
        let now = self.clock.now_ms();

        self.db
            .call(move |conn| Ok(EXPIRY_SWEEP.run(conn, now, SweepAction::Count)?))
            .await
    }

    /// Every stored key, live or expired, in key order.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.db
            .call(|conn| {
                let mut stmt = conn.prepare_cached("SELECT key FROM cache ORDER BY key")?;
                let keys = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(keys)
            })
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde::Deserialize;
    use serde_json::{Value, json};

    use crate::error::Error;
    use crate::store::clock::ManualClock;

    fn cache() -> (Cache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let db = Database::open_in_memory().expect("open");
        (Cache::new(db, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (cache, _) = cache();
        cache
            .set("k", &json!({ "v": 1 }), Duration::from_secs(1))
            .await
            .expect("set");

        let value: Option<Value> = cache.get("k").await.expect("get");
        assert_eq!(value, Some(json!({ "v": 1 })));
    }

    #[tokio::test]
    async fn test_lazy_expiry_without_sweep() {
        let (cache, clock) = cache();
        cache.set("k", &"v", Duration::from_secs(1)).await.expect("set");

        clock.advance(Duration::from_millis(1_001));

        let value: Option<String> = cache.get("k").await.expect("get");
        assert_eq!(value, None);
        assert_eq!(cache.keys().await.expect("keys"), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn test_expiry_boundary_is_exclusive() {
        let (cache, clock) = cache();
        cache.set("k", &1, Duration::from_secs(1)).await.expect("set");

        clock.advance(Duration::from_millis(999));
        assert_eq!(cache.get::<i32>("k").await.expect("get"), Some(1));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get::<i32>("k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn test_set_overwrites_and_extends() {
        let (cache, clock) = cache();
        cache.set("k", &1, Duration::from_secs(1)).await.expect("set");
        cache.set("k", &2, Duration::from_secs(10)).await.expect("set");

        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get::<i32>("k").await.expect("get"), Some(2));
        assert_eq!(cache.keys().await.expect("keys").len(), 1);
    }

    #[tokio::test]
    async fn test_clear_expired_removes_only_expired() {
        let (cache, clock) = cache();
        cache.set("short", &1, Duration::from_secs(1)).await.expect("set");
        cache.set("edge", &2, Duration::from_secs(2)).await.expect("set");
        cache.set("long", &3, Duration::from_secs(60)).await.expect("set");

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.stale_count().await.expect("stale"), 2);
        assert_eq!(cache.clear_expired().await.expect("sweep"), 2);

        assert_eq!(cache.keys().await.expect("keys"), vec!["long".to_string()]);
        assert_eq!(cache.stale_count().await.expect("stale"), 0);
    }

    #[tokio::test]
    async fn test_delete() {
        let (cache, _) = cache();
        cache.set("k", &1, Duration::from_secs(60)).await.expect("set");

        assert!(cache.delete("k").await.expect("delete"));
        assert!(!cache.delete("k").await.expect("delete again"));
        assert_eq!(cache.get::<i32>("k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn test_typed_roundtrip_and_mismatch() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Profile {
            name: String,
            seats: u32,
        }

        let (cache, _) = cache();
        let profile = Profile {
            name: "acme".into(),
            seats: 12,
        };
        cache.set("profile", &profile, Duration::from_secs(60)).await.expect("set");

        let loaded: Option<Profile> = cache.get("profile").await.expect("get");
        assert_eq!(loaded, Some(profile));

        let err = cache.get::<Vec<u8>>("profile").await.unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
