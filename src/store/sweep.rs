//! Timestamp range sweeps.
//!
//! Cache expiry and sync queue retention are the same operation: select rows
//! whose timestamp column falls below a cutoff (optionally narrowed by an
//! extra predicate) and act on them. A [`Sweep`] describes the range once and
//! runs it as a single indexed statement.

// ============================================================================
// Imports
// ============================================================================

use rusqlite::{Connection, params};
use tracing::debug;

// ============================================================================
// Types
// ============================================================================

/// Whether rows exactly at the cutoff are included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// `column <= cutoff`
    Inclusive,
    /// `column < cutoff`
    Exclusive,
}

/// What to do with matching rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    /// Physically remove them.
    Delete,
    /// Only count them.
    Count,
}

// ============================================================================
// Sweep
// ============================================================================

/// A range predicate over one timestamp column of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
    table: &'static str,
    column: &'static str,
    bound: Bound,
    filter: Option<&'static str>,
}

impl Sweep {
    /// Creates a sweep over `table.column`.
    #[inline]
    #[must_use]
    pub const fn new(table: &'static str, column: &'static str, bound: Bound) -> Self {
        Self {
            table,
            column,
            bound,
            filter: None,
        }
    }

    /// Adds a fixed SQL predicate that rows must also satisfy.
    #[inline]
    #[must_use]
    pub const fn with_filter(mut self, filter: &'static str) -> Self {
        self.filter = Some(filter);
        self
    }

    /// SQL `WHERE` clause with the cutoff bound to `?1`.
    fn predicate(&self) -> String {
        let op = match self.bound {
            Bound::Inclusive => "<=",
            Bound::Exclusive => "<",
        };

        match self.filter {
            Some(filter) => format!("{} {op} ?1 AND {filter}", self.column),
            None => format!("{} {op} ?1", self.column),
        }
    }

    /// Applies `action` to every row below `cutoff`.
    ///
    /// Returns the number of affected (or counted) rows.
    pub fn run(
        &self,
        conn: &Connection,
        cutoff: i64,
        action: SweepAction,
    ) -> rusqlite::Result<usize> {
        let predicate = self.predicate();

        let affected = match action {
            SweepAction::Delete => {
                let sql = format!("DELETE FROM {} WHERE {predicate}", self.table);
                conn.prepare_cached(&sql)?.execute(params![cutoff])?
            }
            SweepAction::Count => {
                let sql = format!("SELECT COUNT(*) FROM {} WHERE {predicate}", self.table);
                let count: i64 = conn
                    .prepare_cached(&sql)?
                    .query_row(params![cutoff], |row| row.get(0))?;
                usize::try_from(count).unwrap_or_default()
            }
        };

        debug!(
            table = self.table,
            column = self.column,
            cutoff,
            ?action,
            affected,
            "Sweep finished"
        );

        Ok(affected)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(
            "
            CREATE TABLE t (id INTEGER PRIMARY KEY, at INTEGER, flag TEXT);
            INSERT INTO t (at, flag) VALUES (10, 'a'), (20, 'b'), (20, 'a'), (30, 'a'), (NULL, 'a');
            ",
        )
        .expect("seed");
        conn
    }

    #[test]
    fn test_predicate_rendering() {
        let sweep = Sweep::new("t", "at", Bound::Exclusive).with_filter("flag = 'a'");
        assert_eq!(sweep.predicate(), "at < ?1 AND flag = 'a'");
        assert_eq!(Sweep::new("t", "at", Bound::Inclusive).predicate(), "at <= ?1");
    }

    #[test]
    fn test_inclusive_delete() {
        let conn = table();
        let sweep = Sweep::new("t", "at", Bound::Inclusive);

        assert_eq!(sweep.run(&conn, 20, SweepAction::Delete).expect("sweep"), 3);
        assert_eq!(sweep.run(&conn, i64::MAX, SweepAction::Count).expect("count"), 1);
    }

    #[test]
    fn test_exclusive_filtered_count_ignores_nulls() {
        let conn = table();
        let sweep = Sweep::new("t", "at", Bound::Exclusive).with_filter("flag = 'a'");

        assert_eq!(sweep.run(&conn, 20, SweepAction::Count).expect("count"), 1);
        assert_eq!(sweep.run(&conn, 31, SweepAction::Count).expect("count"), 3);
    }
}
