//! The one-call entry points used at application startup and by the CLI.

use crate::error::Error;
use crate::introspect::Inspector;
use crate::migrate::Executor;
use crate::plan::{Plan, plan_all};
use crate::report::MigrationReport;
use crate::traced::{Connection, ConnectionExt};
use indexmap::IndexSet;
use mortar_schema::TableSpec;

/// Fail with [`Error::Connectivity`] unless the database answers a trivial query.
pub async fn check_connection<C: Connection + ?Sized>(conn: &C) -> Result<(), Error> {
    conn.traced()
        .query("SELECT 1", &[])
        .await
        .map_err(|e| Error::Connectivity(e.to_string()))?;
    Ok(())
}

/// Compute what [`reconcile`] would do, without doing it.
pub async fn plan<C: Connection + ?Sized>(conn: &C, specs: &[TableSpec]) -> Result<Plan, Error> {
    mortar_schema::validate_all(specs)?;
    check_connection(conn).await?;

    let mut tables: IndexSet<&str> = IndexSet::new();
    for spec in specs {
        tables.insert(&spec.name);
        tables.extend(spec.referenced_tables());
    }
    let tables: Vec<&str> = tables.into_iter().collect();

    let snapshot = Inspector::new(conn).snapshot(&tables).await?;
    let plan = plan_all(specs, &snapshot)?;

    for drift in &plan.drift {
        tracing::warn!(%drift, "schema drift");
    }
    tracing::debug!(
        dialect = %conn.dialect(),
        operations = plan.operations.len(),
        "planned"
    );
    Ok(plan)
}

/// Bring the database in line with `specs`.
///
/// Configuration and connectivity problems are returned as errors before
/// any DDL runs. Per-operation failures are recorded in the report.
pub async fn reconcile<C: Connection + ?Sized>(
    conn: &C,
    specs: &[TableSpec],
) -> Result<MigrationReport, Error> {
    let plan = plan(conn, specs).await?;
    if plan.is_empty() {
        tracing::info!("schema is up to date");
    }
    Ok(Executor::new(conn).apply(&plan.operations).await)
}
