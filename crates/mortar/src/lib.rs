//! Idempotent schema reconciliation for SQLite and PostgreSQL.
//!
//! mortar brings a live database in line with a set of [`TableSpec`]s:
//! it inspects what exists, plans the missing tables, columns and
//! constraints, and applies them one transaction at a time. It never drops
//! or alters anything that already exists.
//!
//! ## Example
//!
//! ```ignore
//! use mortar::{ColumnSpec, DefaultValue, TableSpec};
//!
//! let assignment = TableSpec::new("assignment")
//!     .column(ColumnSpec::id())
//!     .column(ColumnSpec::string("title", 200).not_null())
//!     .column(
//!         ColumnSpec::string("status", 20)
//!             .not_null()
//!             .default(DefaultValue::text("Active")),
//!     );
//!
//! let db = mortar::connect("sqlite:///school.db").await?;
//! let report = mortar::reconcile(&db, &[assignment]).await?;
//! print!("{}", report);
//! ```
//!
//! ## Pieces
//!
//! - [`Dialect`] renders every engine-specific statement.
//! - [`Inspector`] reads the live catalog into a [`SchemaSnapshot`].
//! - [`plan_all`] diffs specs against a snapshot into [`DdlOperation`]s.
//! - [`Executor`] applies them and returns a [`MigrationReport`].
//! - [`OrphanCleaner`] removes rows whose foreign key has no parent.

mod connect;
mod dialect;
mod error;
mod introspect;
mod migrate;
mod orphan;
mod plan;
mod reconcile;
mod report;
mod traced;

pub use connect::{Database, connect};
pub use dialect::{Dialect, ExistsQuery, Query};
pub use error::{DbError, Error};
pub use introspect::{Inspector, ObservedColumn, SchemaSnapshot};
pub use migrate::Executor;
pub use orphan::{OrphanCleaner, OrphanRef};
pub use plan::{Constraint, DdlOperation, Drift, DriftKind, Plan, plan_all, plan_table};
pub use reconcile::{check_connection, plan, reconcile};
pub use report::{BackfillOutcome, MigrationReport, MigrationResult, Outcome};
pub use traced::{BoxFuture, Connection, ConnectionExt, SqlRow, SqlValue, SqliteConn, TracedConn};

pub use mortar_schema::{
    ColumnSpec, DefaultValue, ForeignKeyRef, SpecError, SqlType, TableSpec, UniqueConstraint,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;
