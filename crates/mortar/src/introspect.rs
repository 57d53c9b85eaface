//! Reading the live schema.

use crate::dialect::{Dialect, ExistsQuery};
use crate::error::{DbError, Error};
use crate::plan::Constraint;
use crate::traced::{Connection, ConnectionExt};
use indexmap::IndexMap;
use mortar_schema::{ColumnSpec, SqlType, TableSpec};

/// A column as the database reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedColumn {
    pub name: String,
    /// Type name exactly as reported by the catalog
    pub data_type: String,
    /// `data_type` mapped back to a semantic type, when recognized
    pub sql_type: Option<SqlType>,
    pub nullable: bool,
    /// Default expression exactly as reported by the catalog
    pub default: Option<String>,
}

impl ObservedColumn {
    /// The column a database would report after creating `column`.
    pub fn from_spec(dialect: Dialect, column: &ColumnSpec) -> Self {
        Self {
            name: column.name.clone(),
            data_type: dialect.render_column_type(column),
            sql_type: Some(column.sql_type),
            nullable: column.is_nullable(),
            default: column.default.as_ref().map(|d| dialect.render_default(d)),
        }
    }
}

/// The existing tables (among those requested) and their columns.
///
/// Built fresh for every reconciliation and never updated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaSnapshot {
    pub dialect: Dialect,
    pub tables: IndexMap<String, Vec<ObservedColumn>>,
}

impl SchemaSnapshot {
    /// A snapshot of an empty database.
    pub fn empty(dialect: Dialect) -> Self {
        Self {
            dialect,
            tables: IndexMap::new(),
        }
    }

    /// Add a table as if it had been created from `spec`.
    pub fn with_table(mut self, spec: &TableSpec) -> Self {
        let columns = spec
            .columns
            .iter()
            .map(|c| ObservedColumn::from_spec(self.dialect, c))
            .collect();
        self.tables.insert(spec.name.clone(), columns);
        self
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn columns(&self, table: &str) -> Option<&[ObservedColumn]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&ObservedColumn> {
        self.columns(table)?.iter().find(|c| c.name == column)
    }
}

/// Queries the live catalog through a connection.
pub struct Inspector<'a, C: Connection + ?Sized> {
    conn: &'a C,
}

impl<'a, C: Connection + ?Sized> Inspector<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub fn dialect(&self) -> Dialect {
        self.conn.dialect()
    }

    /// Snapshot the requested tables. Tables that don't exist are absent
    /// from the result.
    pub async fn snapshot(&self, tables: &[&str]) -> Result<SchemaSnapshot, Error> {
        let mut snapshot = SchemaSnapshot::empty(self.dialect());
        for table in tables {
            if snapshot.has_table(table) || !self.table_exists(table).await? {
                continue;
            }
            let columns = self.columns(table).await?;
            snapshot.tables.insert(table.to_string(), columns);
        }
        tracing::debug!(
            requested = tables.len(),
            existing = snapshot.tables.len(),
            "schema snapshot taken"
        );
        Ok(snapshot)
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool, Error> {
        Ok(self.exists(self.dialect().table_exists_query(table)).await?)
    }

    pub async fn column_exists(&self, table: &str, column: &str) -> Result<bool, Error> {
        Ok(self
            .exists(self.dialect().column_exists_query(table, column))
            .await?)
    }

    pub async fn constraint_exists(
        &self,
        table: &str,
        constraint: &Constraint,
    ) -> Result<bool, Error> {
        Ok(self
            .exists(self.dialect().constraint_exists_query(table, constraint))
            .await?)
    }

    /// Columns of `table` in ordinal order. Empty when the table is missing.
    pub async fn columns(&self, table: &str) -> Result<Vec<ObservedColumn>, Error> {
        let dialect = self.dialect();
        let query = dialect.columns_query(table);
        let rows = self.conn.traced().query(&query.sql, &query.params()).await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name = row.get_str(0)?.unwrap_or_default().to_string();
            let data_type = row.get_str(1)?.unwrap_or_default().to_string();
            columns.push(ObservedColumn {
                sql_type: dialect.observed_type(&data_type),
                nullable: row.get_bool(2)?.unwrap_or(true),
                default: row.get_str(3)?.map(str::to_string),
                name,
                data_type,
            });
        }
        Ok(columns)
    }

    async fn exists(&self, query: ExistsQuery) -> Result<bool, DbError> {
        let rows = self
            .conn
            .traced()
            .query(query.sql(), &query.params())
            .await?;
        query.evaluate(&rows)
    }
}
