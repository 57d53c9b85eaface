//! Opening a connection from a connection string.

use crate::dialect::Dialect;
use crate::error::{DbError, Error};
use crate::traced::{BoxFuture, Connection, SqlRow, SqliteConn};
use std::path::PathBuf;

/// A connection to either supported database.
pub enum Database {
    Postgres(tokio_postgres::Client),
    Sqlite(SqliteConn),
}

impl Connection for Database {
    fn dialect(&self) -> Dialect {
        match self {
            Database::Postgres(c) => c.dialect(),
            Database::Sqlite(c) => c.dialect(),
        }
    }

    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a str],
    ) -> BoxFuture<'a, Result<u64, DbError>> {
        match self {
            Database::Postgres(c) => Connection::execute(c, sql, params),
            Database::Sqlite(c) => c.execute(sql, params),
        }
    }

    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<(), DbError>> {
        match self {
            Database::Postgres(c) => Connection::batch_execute(c, sql),
            Database::Sqlite(c) => c.batch_execute(sql),
        }
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<SqlRow>, DbError>> {
        match self {
            Database::Postgres(c) => Connection::query(c, sql, params),
            Database::Sqlite(c) => c.query(sql, params),
        }
    }
}

/// Where a SQLite connection string points.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SqliteTarget {
    Memory,
    File(PathBuf),
}

/// Parse the part of a SQLite URL after the scheme.
///
/// Accepts `sqlite::memory:`, `sqlite://:memory:`, `sqlite://relative.db`,
/// `sqlite:relative.db`, and the `sqlite:///relative.db` /
/// `sqlite:////absolute.db` forms. Query strings are ignored.
fn sqlite_target(url: &str) -> Result<SqliteTarget, Error> {
    let rest = url.split_once(':').map(|(_, rest)| rest).unwrap_or(url);
    let rest = rest.split('?').next().unwrap_or(rest);

    let path = match rest.strip_prefix("//") {
        Some(path) => path.strip_prefix('/').unwrap_or(path),
        None => rest,
    };

    if path == ":memory:" {
        return Ok(SqliteTarget::Memory);
    }
    if path.is_empty() {
        return Err(Error::Configuration(format!(
            "sqlite connection string has no path: {}",
            url
        )));
    }
    Ok(SqliteTarget::File(PathBuf::from(path)))
}

/// Strip a `+driver` suffix from the scheme.
fn postgres_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let scheme = scheme.split('+').next().unwrap_or(scheme);
            format!("{}://{}", scheme, rest)
        }
        None => url.to_string(),
    }
}

/// Connect to the database named by `url`.
///
/// The dialect follows from the scheme. Failing to reach the database is an
/// [`Error::Connectivity`].
pub async fn connect(url: &str) -> Result<Database, Error> {
    match Dialect::from_url(url)? {
        Dialect::Sqlite => {
            let conn = match sqlite_target(url)? {
                SqliteTarget::Memory => SqliteConn::open_in_memory(),
                SqliteTarget::File(path) => SqliteConn::open(&path),
            }
            .map_err(|e| Error::Connectivity(format!("cannot open sqlite database: {}", e)))?;
            Ok(Database::Sqlite(conn))
        }
        Dialect::Postgres => {
            let (client, connection) =
                tokio_postgres::connect(&postgres_url(url), tokio_postgres::NoTls)
                    .await
                    .map_err(|e| {
                        Error::Connectivity(format!("cannot connect to postgres: {}", e))
                    })?;

            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!("postgres connection error: {}", e);
                }
            });

            Ok(Database::Postgres(client))
        }
    }
}
