//! Cleaning up rows whose foreign key points at a missing parent.
//!
//! Run this before deleting a parent that other tables reference, so the
//! delete doesn't trip over (or cascade through) stale references.

use crate::error::Error;
use crate::traced::{Connection, ConnectionExt};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A child-table foreign key and the parent column it should resolve to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrphanRef {
    pub child_table: String,
    pub fk_column: String,
    pub parent_table: String,
    #[serde(default = "default_parent_column")]
    pub parent_column: String,
}

fn default_parent_column() -> String {
    "id".to_string()
}

impl OrphanRef {
    /// A reference to `parent_table.id`.
    pub fn new(
        child_table: impl Into<String>,
        fk_column: impl Into<String>,
        parent_table: impl Into<String>,
    ) -> Self {
        Self {
            child_table: child_table.into(),
            fk_column: fk_column.into(),
            parent_table: parent_table.into(),
            parent_column: default_parent_column(),
        }
    }
}

impl fmt::Display for OrphanRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.child_table, self.fk_column, self.parent_table, self.parent_column
        )
    }
}

pub struct OrphanCleaner<'a, C: Connection + ?Sized> {
    conn: &'a C,
}

impl<'a, C: Connection + ?Sized> OrphanCleaner<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Count orphaned rows per reference without deleting anything.
    ///
    /// References that can't be checked (missing table, ...) are logged and
    /// left out of the result.
    pub async fn count(&self, refs: &[OrphanRef]) -> IndexMap<OrphanRef, u64> {
        let mut counts = IndexMap::new();
        for orphan in refs {
            match self.count_one(orphan).await {
                Ok(n) => {
                    counts.insert(orphan.clone(), n);
                }
                Err(e) => tracing::warn!(reference = %orphan, error = %e, "cannot count orphans"),
            }
        }
        counts
    }

    /// Delete orphaned rows, returning how many were deleted per reference.
    ///
    /// A clean reference is recorded with 0. References that fail are logged
    /// and left out of the result; the others still run.
    pub async fn clean(&self, refs: &[OrphanRef]) -> IndexMap<OrphanRef, u64> {
        let mut deleted = IndexMap::new();
        for orphan in refs {
            match self.clean_one(orphan).await {
                Ok(n) => {
                    deleted.insert(orphan.clone(), n);
                }
                Err(e) => tracing::warn!(reference = %orphan, error = %e, "cannot clean orphans"),
            }
        }
        deleted
    }

    async fn count_one(&self, orphan: &OrphanRef) -> Result<u64, Error> {
        let sql = self.conn.dialect().orphan_count_sql(
            &orphan.child_table,
            &orphan.fk_column,
            &orphan.parent_table,
            &orphan.parent_column,
        );
        let rows = self.conn.traced().query(&sql, &[]).await?;
        let count = match rows.first() {
            Some(row) => row.get_i64(0)?.unwrap_or(0),
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn clean_one(&self, orphan: &OrphanRef) -> Result<u64, Error> {
        if self.count_one(orphan).await? == 0 {
            return Ok(0);
        }
        let sql = self.conn.dialect().orphan_delete_sql(
            &orphan.child_table,
            &orphan.fk_column,
            &orphan.parent_table,
            &orphan.parent_column,
        );
        let deleted = self.conn.traced().execute(&sql, &[]).await?;
        tracing::info!(reference = %orphan, deleted, "deleted orphaned rows");
        Ok(deleted)
    }
}
