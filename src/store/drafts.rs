//! Draft store: work-in-progress objects keyed by `(kind, entity_id)`.
//!
//! `save` is a single-statement upsert; the last writer wins. There is no
//! versioning or conflict detection.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::DraftKey;

use super::clock::Clock;
use super::database::{Database, json_column};

// ============================================================================
// DraftItem
// ============================================================================

/// A persisted draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftItem {
    /// Composite key `<kind>_<entity_id>`.
    pub id: DraftKey,

    /// Entity type, e.g. `lead`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Entity identifier within its type.
    pub entity_id: String,

    /// Draft body.
    pub data: Value,

    /// Last save time (epoch ms).
    pub updated_at: i64,
}

impl DraftItem {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: DraftKey::from(row.get::<_, String>(0)?),
            kind: row.get(1)?,
            entity_id: row.get(2)?,
            data: json_column(row, 3)?,
            updated_at: row.get(4)?,
        })
    }
}

// ============================================================================
// DraftStore
// ============================================================================

/// Handle to the `drafts` collection.
#[derive(Clone)]
pub struct DraftStore {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DraftStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftStore").field("db", &self.db).finish()
    }
}

impl DraftStore {
    pub(crate) fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Saves `data` as the draft for `(kind, entity_id)`, overwriting any
    /// previous draft.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `kind` or `entity_id` is empty
    /// - [`Error::Json`] if `data` cannot be serialized
    /// - A storage error if the write is rejected
    pub async fn save<T>(&self, kind: &str, entity_id: &str, data: &T) -> Result<DraftItem>
    where
        T: Serialize + ?Sized,
    {
        validate_key(kind, entity_id)?;

        let item = DraftItem {
            id: DraftKey::new(kind, entity_id),
            kind: kind.to_owned(),
            entity_id: entity_id.to_owned(),
            data: serde_json::to_value(data)?,
            updated_at: self.clock.now_ms(),
        };
        let raw = serde_json::to_string(&item.data)?;
        let row = item.clone();

        self.db
            .call(move |conn| {
                conn.prepare_cached(
                    "INSERT INTO drafts (id, kind, entity_id, data, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (id) DO UPDATE
                     SET kind = excluded.kind,
                         entity_id = excluded.entity_id,
                         data = excluded.data,
                         updated_at = excluded.updated_at",
                )?
                .execute(params![
                    row.id.as_str(),
                    row.kind,
                    row.entity_id,
                    raw,
                    row.updated_at
                ])?;
                Ok(())
            })
            .await?;

        debug!(id = %item.id, "Draft saved");
        Ok(item)
    }

    /// Returns the draft for `(kind, entity_id)`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    pub async fn get(&self, kind: &str, entity_id: &str) -> Result<Option<DraftItem>> {
        let id = DraftKey::new(kind, entity_id);

        self.db
            .call(move |conn| {
                let item = conn
                    .prepare_cached(
                        "SELECT id, kind, entity_id, data, updated_at FROM drafts WHERE id = ?1",
                    )?
                    .query_row(params![id.as_str()], DraftItem::from_row)
                    .optional()?;
                Ok(item)
            })
            .await
    }

    /// Deletes the draft for `(kind, entity_id)`. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete is rejected.
    pub async fn delete(&self, kind: &str, entity_id: &str) -> Result<bool> {
        let id = DraftKey::new(kind, entity_id);

        let removed = self
            .db
            .call(move |conn| {
                let removed = conn
                    .prepare_cached("DELETE FROM drafts WHERE id = ?1")?
                    .execute(params![id.as_str()])?;
                Ok(removed > 0)
            })
            .await?;

        if removed {
            debug!(kind, entity_id, "Draft deleted");
        }
        Ok(removed)
    }

    /// Returns every draft of `kind`, most recently saved first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub async fn by_kind(&self, kind: &str) -> Result<Vec<DraftItem>> {
        let kind = kind.to_owned();

        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, kind, entity_id, data, updated_at FROM drafts
                     WHERE kind = ?1 ORDER BY updated_at DESC, id",
                )?;
                let items = stmt
                    .query_map(params![kind], DraftItem::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(items)
            })
            .await
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn validate_key(kind: &str, entity_id: &str) -> Result<()> {
    if kind.is_empty() {
        return Err(Error::invalid_argument("Draft type must not be empty"));
    }
    if entity_id.is_empty() {
        return Err(Error::invalid_argument("Draft entity id must not be empty"));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
