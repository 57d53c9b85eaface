use mortar_schema::SpecError;
use thiserror::Error;

/// Errors raised by a database driver.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("unexpected value in column {index}: {reason}")]
    Decode { index: usize, reason: String },

    #[error("sqlite connection lock poisoned")]
    Poisoned,

    #[error("{0}")]
    Unsupported(String),
}

impl DbError {
    /// Whether this error means the database cannot be reached at all.
    pub fn is_connectivity(&self) -> bool {
        match self {
            DbError::Postgres(e) => e.is_closed(),
            DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::CannotOpen | rusqlite::ErrorCode::NotADatabase
            ),
            DbError::Poisoned => true,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Unsupported dialect or malformed table spec. Raised before any DDL.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The database cannot be reached. Raised before any DDL.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// A CREATE/ALTER statement failed.
    #[error("DDL failed: {statement}: {source}")]
    Ddl {
        statement: String,
        #[source]
        source: DbError,
    },

    /// The UPDATE populating a freshly added column failed.
    #[error("backfill of {table}.{column} failed: {source}")]
    DataBackfill {
        table: String,
        column: String,
        #[source]
        source: DbError,
    },

    /// A metadata query failed.
    #[error(transparent)]
    Database(DbError),
}

impl From<DbError> for Error {
    fn from(err: DbError) -> Self {
        if err.is_connectivity() {
            Error::Connectivity(err.to_string())
        } else {
            Error::Database(err)
        }
    }
}

impl From<SpecError> for Error {
    fn from(err: SpecError) -> Self {
        Error::Configuration(err.to_string())
    }
}

impl Error {
    /// Whether this error aborts a whole reconciliation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::Connectivity(_) | Error::Database(_)
        )
    }
}
