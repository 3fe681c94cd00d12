//! Sync queue: durable log of outbound mutations.
//!
//! Any mutation that must survive a restart or a dropped connection is
//! written here first and replayed once the peer is reachable.
//!
//! # Item Lifecycle
//!
//! ```text
//! add() ──► pending ──mark_synced()──► synced ──clear_old()──► deleted
//! ```
//!
//! Status never moves back to pending, and `clear_old` never touches pending
//! items regardless of their age.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::QueueItemId;

use super::clock::Clock;
use super::database::{Database, json_column};
use super::sweep::{Bound, Sweep, SweepAction};

// ============================================================================
// Constants
// ============================================================================

/// Milliseconds per day.
const DAY_MS: i64 = 86_400_000;

/// Synced items whose `synced_at` is older than the cutoff.
const RETENTION_SWEEP: Sweep =
    Sweep::new("sync_queue", "synced_at", Bound::Exclusive).with_filter("status = 'synced'");

const SELECT_COLUMNS: &str =
    "SELECT id, kind, payload, timestamp, status, synced_at FROM sync_queue";

// ============================================================================
// SyncStatus
// ============================================================================

/// Delivery status of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Awaiting delivery.
    Pending,
    /// Delivered to the peer.
    Synced,
}

impl SyncStatus {
    /// Column value.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
        }
    }

    fn from_column(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "synced" => Some(Self::Synced),
            _ => None,
        }
    }
}

// ============================================================================
// Operation / SyncQueueItem
// ============================================================================

/// A mutation to enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Mutation type, e.g. `lead.update`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Mutation body.
    pub payload: Value,
}

impl Operation {
    /// Creates a new operation.
    #[inline]
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// A persisted queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    /// Auto-generated key.
    pub id: QueueItemId,

    /// Mutation type.
    #[serde(rename = "type")]
    pub kind: String,

    /// Mutation body.
    pub payload: Value,

    /// Enqueue time (epoch ms).
    pub timestamp: i64,

    /// Delivery status.
    pub status: SyncStatus,

    /// Time of the `pending → synced` transition (epoch ms).
    pub synced_at: Option<i64>,
}

impl SyncQueueItem {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(4)?;
        let status = SyncStatus::from_column(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("unknown status '{status}'").into(),
            )
        })?;

        Ok(Self {
            id: QueueItemId::new(row.get(0)?),
            kind: row.get(1)?,
            payload: json_column(row, 2)?,
            timestamp: row.get(3)?,
            status,
            synced_at: row.get(5)?,
        })
    }

    /// Returns `true` if the item still awaits delivery.
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == SyncStatus::Pending
    }
}

// ============================================================================
// SyncQueue
// ============================================================================

/// Handle to the `sync_queue` collection.
#[derive(Clone)]
pub struct SyncQueue {
    db: Database,
    clock: Arc<dyn Clock>,
    /// Log a warning once this many items are pending.
    warn_threshold: Option<usize>,
}

impl std::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("db", &self.db)
            .field("warn_threshold", &self.warn_threshold)
            .finish()
    }
}

impl SyncQueue {
    pub(crate) fn new(db: Database, clock: Arc<dyn Clock>, warn_threshold: Option<usize>) -> Self {
        Self {
            db,
            clock,
            warn_threshold,
        }
    }

    /// Appends a pending item and returns its generated ID.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the operation type is empty
    /// - A storage error if the insert is rejected
    pub async fn add(&self, operation: Operation) -> Result<QueueItemId> {
        validate_operation(&operation)?;

        let payload = serde_json::to_string(&operation.payload)?;
        let timestamp = self.clock.now_ms();
        let count_pending = self.warn_threshold.is_some();

        let (id, pending) = self
            .db
            .call(move |conn| {
                conn.prepare_cached(
                    "INSERT INTO sync_queue (kind, payload, timestamp, status)
                     VALUES (?1, ?2, ?3, 'pending')",
                )?
                .execute(params![operation.kind, payload, timestamp])?;
                let id = conn.last_insert_rowid();

                let pending = if count_pending {
                    Some(count_pending_rows(conn)?)
                } else {
                    None
                };
                Ok((QueueItemId::new(id), pending))
            })
            .await?;

        debug!(%id, "Operation queued");

        if let (Some(threshold), Some(pending)) = (self.warn_threshold, pending)
            && pending > threshold
        {
            warn!(pending, threshold, "Sync queue backlog above threshold");
        }

        Ok(id)
    }

    /// Returns every pending item, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub async fn pending(&self) -> Result<Vec<SyncQueueItem>> {
        self.db
            .call(|conn| {
                let sql = format!("{SELECT_COLUMNS} WHERE status = 'pending' ORDER BY id");
                let mut stmt = conn.prepare_cached(&sql)?;
                let items = stmt
                    .query_map([], SyncQueueItem::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(items)
            })
            .await
    }

    /// Number of pending items.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub async fn pending_count(&self) -> Result<usize> {
        self.db.call(|conn| Ok(count_pending_rows(conn)?)).await
    }

    /// Looks up one item by ID.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub async fn get(&self, id: QueueItemId) -> Result<Option<SyncQueueItem>> {
        self.db
            .call(move |conn| {
                let item = conn
                    .prepare_cached(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?
                    .query_row(params![id.as_i64()], SyncQueueItem::from_row)
                    .optional()?;
                Ok(item)
            })
            .await
    }

    /// Flips a pending item to synced.
    ///
    /// Runs as one conditional `UPDATE`, so concurrent callers cannot race
    /// the transition. Returns `false` if the ID is absent or already synced.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the update is rejected.
    pub async fn mark_synced(&self, id: QueueItemId) -> Result<bool> {
        let now = self.clock.now_ms();

        let changed = self
            .db
            .call(move |conn| {
                let changed = conn
                    .prepare_cached(
                        "UPDATE sync_queue SET status = 'synced', synced_at = ?1
                         WHERE id = ?2 AND status = 'pending'",
                    )?
                    .execute(params![now, id.as_i64()])?;
                Ok(changed > 0)
            })
            .await?;

        if changed {
            debug!(%id, "Operation marked synced");
        }
        Ok(changed)
    }

    /// Deletes synced items whose `synced_at` is more than `days` old.
    ///
    /// Pending items are never deleted. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete is rejected.
    pub async fn clear_old(&self, days: u32) -> Result<usize> {
        let cutoff = self
            .clock
            .now_ms()
            .saturating_sub(i64::from(days).saturating_mul(DAY_MS));

        self.db
            .call(move |conn| Ok(RETENTION_SWEEP.run(conn, cutoff, SweepAction::Delete)?))
            .await
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn count_pending_rows(conn: &rusqlite::Connection) -> rusqlite::Result<usize> {
    let count: i64 = conn
        .prepare_cached("SELECT COUNT(*) FROM sync_queue WHERE status = 'pending'")?
        .query_row([], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or_default())
}

/// Rejects empty operation types.
fn validate_operation(operation: &Operation) -> Result<()> {
    if operation.kind.trim().is_empty() {
        return Err(Error::invalid_argument("Operation type must not be empty"));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
