//! Database connections and the traced wrapper.
//!
//! [`Connection`] is the only seam between mortar and a driver. It is
//! implemented for `tokio_postgres::Client` and for [`SqliteConn`], and
//! every component takes one by reference in its constructor. Statements
//! only ever bind text parameters (table, column and constraint names), so
//! the trait stays small.

use crate::dialect::Dialect;
use crate::error::DbError;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Mutex;
use tokio_postgres::types::{ToSql, Type};
use tracing::Instrument;

/// A boxed future returned by [`Connection`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single value read back from a query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Text(String),
}

/// A row read back from a query.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    fn value(&self, index: usize) -> Result<&SqlValue, DbError> {
        self.values.get(index).ok_or_else(|| DbError::Decode {
            index,
            reason: format!("row has only {} columns", self.values.len()),
        })
    }

    /// Read a text column.
    pub fn get_str(&self, index: usize) -> Result<Option<&str>, DbError> {
        match self.value(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s)),
            other => Err(DbError::Decode {
                index,
                reason: format!("expected text, got {:?}", other),
            }),
        }
    }

    /// Read an integer column.
    pub fn get_i64(&self, index: usize) -> Result<Option<i64>, DbError> {
        match self.value(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Integer(v) => Ok(Some(*v)),
            other => Err(DbError::Decode {
                index,
                reason: format!("expected integer, got {:?}", other),
            }),
        }
    }

    /// Read a boolean column. SQLite reports booleans as 0/1 integers.
    pub fn get_bool(&self, index: usize) -> Result<Option<bool>, DbError> {
        match self.value(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Boolean(v) => Ok(Some(*v)),
            SqlValue::Integer(v) => Ok(Some(*v != 0)),
            other => Err(DbError::Decode {
                index,
                reason: format!("expected boolean, got {:?}", other),
            }),
        }
    }
}

/// Trait for database connections mortar can run statements on.
///
/// This is implemented for `tokio_postgres::Client` and [`SqliteConn`].
pub trait Connection: Send + Sync {
    /// The SQL dialect spoken by this connection.
    fn dialect(&self) -> Dialect;

    /// Execute a statement, returning the number of rows affected.
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a str],
    ) -> BoxFuture<'a, Result<u64, DbError>>;

    /// Execute one or more statements without parameters.
    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<(), DbError>>;

    /// Execute a query, returning all rows.
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<SqlRow>, DbError>>;
}

fn pg_params<'a>(params: &'a [&'a str]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn pg_row(row: &tokio_postgres::Row) -> Result<SqlRow, DbError> {
    let mut values = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(index)?
                .map(SqlValue::Boolean)
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(index)?
                .map(|v| SqlValue::Integer(v.into()))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(index)?
                .map(|v| SqlValue::Integer(v.into()))
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(index)?
                .map(SqlValue::Integer)
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(index)?
                .map(|v| SqlValue::Real(v.into()))
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(index)?
                .map(SqlValue::Real)
        } else if *ty == Type::TEXT
            || *ty == Type::VARCHAR
            || *ty == Type::NAME
            || *ty == Type::BPCHAR
        {
            row.try_get::<_, Option<String>>(index)?
                .map(SqlValue::Text)
        } else {
            return Err(DbError::Decode {
                index,
                reason: format!("unsupported postgres type {}", ty),
            });
        };
        values.push(value.unwrap_or(SqlValue::Null));
    }
    Ok(SqlRow::new(values))
}

impl Connection for tokio_postgres::Client {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a str],
    ) -> BoxFuture<'a, Result<u64, DbError>> {
        Box::pin(async move {
            let params = pg_params(params);
            Ok(tokio_postgres::Client::execute(self, sql, &params).await?)
        })
    }

    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<(), DbError>> {
        Box::pin(async move { Ok(tokio_postgres::Client::batch_execute(self, sql).await?) })
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<SqlRow>, DbError>> {
        Box::pin(async move {
            let params = pg_params(params);
            let rows = tokio_postgres::Client::query(self, sql, &params).await?;
            rows.iter().map(pg_row).collect()
        })
    }
}

/// A SQLite connection usable from async code.
///
/// rusqlite is synchronous, so every call runs to completion while holding
/// the lock and hands back an already-resolved future.
pub struct SqliteConn {
    inner: Mutex<rusqlite::Connection>,
}

impl SqliteConn {
    /// Wrap an existing connection.
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self {
            inner: Mutex::new(conn),
        }
    }

    /// Open (or create) a database file with foreign keys enforced.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self::new(conn))
    }

    /// Open a private in-memory database with foreign keys enforced.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = rusqlite::Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self::new(conn))
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&rusqlite::Connection) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let conn = self.inner.lock().map_err(|_| DbError::Poisoned)?;
        f(&conn)
    }
}

fn sqlite_value(index: usize, value: rusqlite::types::ValueRef<'_>) -> Result<SqlValue, DbError> {
    use rusqlite::types::ValueRef;

    Ok(match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(_) => {
            return Err(DbError::Decode {
                index,
                reason: "unexpected blob".to_string(),
            });
        }
    })
}

impl Connection for SqliteConn {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a str],
    ) -> BoxFuture<'a, Result<u64, DbError>> {
        let result = self.with_conn(|conn| {
            let affected = conn.execute(sql, rusqlite::params_from_iter(params.iter()))?;
            Ok(affected as u64)
        });
        Box::pin(std::future::ready(result))
    }

    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<(), DbError>> {
        let result = self.with_conn(|conn| Ok(conn.execute_batch(sql)?));
        Box::pin(std::future::ready(result))
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<SqlRow>, DbError>> {
        let result = self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let width = stmt.column_count();
            let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(width);
                for index in 0..width {
                    values.push(sqlite_value(index, row.get_ref(index)?)?);
                }
                out.push(SqlRow::new(values));
            }
            Ok(out)
        });
        Box::pin(std::future::ready(result))
    }
}

/// A wrapper around a database connection that logs all statements via tracing.
///
/// This is a thin wrapper that delegates to the underlying connection but adds
/// `tracing::debug_span!` around each call.
///
/// # Example
///
/// ```ignore
/// use mortar::ConnectionExt;
///
/// let rows = conn.traced().query("SELECT 1", &[]).await?;
/// ```
pub struct TracedConn<'a, C: Connection + ?Sized> {
    conn: &'a C,
}

impl<'a, C: Connection + ?Sized> TracedConn<'a, C> {
    /// Create a new traced connection wrapper.
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Execute a statement, returning the number of rows affected.
    pub async fn execute(&self, sql: &str, params: &[&str]) -> Result<u64, DbError> {
        let span = tracing::debug_span!(
            "db.execute",
            sql = %sql,
            params = params.len(),
            affected = tracing::field::Empty,
        );
        let affected = self
            .conn
            .execute(sql, params)
            .instrument(span.clone())
            .await?;
        span.record("affected", affected);
        Ok(affected)
    }

    /// Execute one or more statements without parameters.
    pub async fn batch_execute(&self, sql: &str) -> Result<(), DbError> {
        let span = tracing::debug_span!("db.batch_execute", sql = %sql);
        self.conn.batch_execute(sql).instrument(span).await
    }

    /// Execute a query, returning all rows.
    pub async fn query(&self, sql: &str, params: &[&str]) -> Result<Vec<SqlRow>, DbError> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let rows = self
            .conn
            .query(sql, params)
            .instrument(span.clone())
            .await?;
        span.record("rows", rows.len());
        Ok(rows)
    }
}

/// Extension trait to get a traced wrapper from a connection.
pub trait ConnectionExt: Connection {
    /// Wrap this connection in a `TracedConn` for statement logging.
    fn traced(&self) -> TracedConn<'_, Self> {
        TracedConn::new(self)
    }
}

impl<C: Connection + ?Sized> ConnectionExt for C {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_roundtrip_values() {
        let conn = SqliteConn::open_in_memory().unwrap();
        conn.batch_execute("CREATE TABLE t (a INTEGER, b TEXT, c REAL, d BOOLEAN)")
            .await
            .unwrap();
        let affected = conn
            .execute("INSERT INTO t VALUES (1, ?1, 2.5, 1)", &["x"])
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let rows = conn.query("SELECT a, b, c, d, NULL FROM t", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.get_i64(0).unwrap(), Some(1));
        assert_eq!(row.get_str(1).unwrap(), Some("x"));
        assert_eq!(row.get_bool(3).unwrap(), Some(true));
        assert_eq!(row.get_str(4).unwrap(), None);
    }

    #[tokio::test]
    async fn test_row_decode_errors() {
        let row = SqlRow::new(vec![SqlValue::Text("x".into())]);
        assert!(matches!(row.get_i64(0), Err(DbError::Decode { index: 0, .. })));
        assert!(matches!(row.get_str(3), Err(DbError::Decode { index: 3, .. })));
    }

    #[tokio::test]
    async fn test_traced_wrapper_delegates() {
        let conn = SqliteConn::open_in_memory().unwrap();
        let traced = conn.traced();
        traced
            .batch_execute("CREATE TABLE t (a INTEGER)")
            .await
            .unwrap();
        assert_eq!(traced.execute("INSERT INTO t VALUES (7)", &[]).await.unwrap(), 1);
        let rows = traced.query("SELECT a FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].get_i64(0).unwrap(), Some(7));
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let conn = SqliteConn::open_in_memory().unwrap();
        let rows = conn
            .with_conn(|c| Ok(c.query_row("PRAGMA foreign_keys", [], |r| r.get::<_, i64>(0))?))
            .unwrap();
        assert_eq!(rows, 1);
    }
}
