//! Applying planned DDL.
//!
//! Every operation is its own unit of work: existence is re-checked right
//! before it runs, and it is committed or rolled back before the next one
//! starts. A failure is recorded in the report and never stops the run.

use crate::error::Error;
use crate::introspect::Inspector;
use crate::plan::DdlOperation;
use crate::report::{BackfillOutcome, MigrationReport, MigrationResult, Outcome};
use crate::traced::{Connection, ConnectionExt};
use mortar_schema::ColumnSpec;

const BACKFILL_SAVEPOINT: &str = "mortar_backfill";

pub struct Executor<'a, C: Connection + ?Sized> {
    conn: &'a C,
    inspector: Inspector<'a, C>,
}

impl<'a, C: Connection + ?Sized> Executor<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self {
            conn,
            inspector: Inspector::new(conn),
        }
    }

    /// Apply `operations` in order.
    pub async fn apply(&self, operations: &[DdlOperation]) -> MigrationReport {
        let mut report = MigrationReport::default();
        for operation in operations {
            let result = self.apply_one(operation).await;
            match &result.outcome {
                Outcome::Applied => tracing::info!(operation = %operation, "applied"),
                Outcome::AlreadySatisfied => {
                    tracing::debug!(operation = %operation, "already satisfied")
                }
                Outcome::Failed(reason) => {
                    tracing::warn!(operation = %operation, %reason, "operation failed")
                }
            }
            report.results.push(result);
        }
        tracing::info!(
            applied = report.applied(),
            already_satisfied = report.already_satisfied(),
            failed = report.failures().count(),
            "migration finished"
        );
        report
    }

    async fn apply_one(&self, operation: &DdlOperation) -> MigrationResult {
        let result = |outcome: Outcome, backfill: Option<BackfillOutcome>| MigrationResult {
            operation: operation.clone(),
            outcome,
            backfill,
        };

        match self.is_satisfied(operation).await {
            Ok(true) => return result(Outcome::AlreadySatisfied, None),
            Ok(false) => {}
            Err(e) => return result(Outcome::Failed(e.to_string()), None),
        }

        let sql = match operation.to_sql(self.conn.dialect()) {
            Ok(sql) => sql,
            Err(source) => {
                let err = Error::Ddl {
                    statement: operation.to_string(),
                    source,
                };
                return result(Outcome::Failed(err.to_string()), None);
            }
        };

        let db = self.conn.traced();
        if let Err(e) = db.batch_execute("BEGIN").await {
            return result(Outcome::Failed(Error::from(e).to_string()), None);
        }

        if let Err(source) = db.batch_execute(&sql).await {
            self.rollback().await;
            let err = Error::Ddl {
                statement: sql,
                source,
            };
            return result(Outcome::Failed(err.to_string()), None);
        }

        let backfill = match operation {
            DdlOperation::AddColumn { table, column } if column.default.is_some() => {
                self.backfill_in_transaction(table, column).await
            }
            _ => None,
        };

        if let Err(source) = db.batch_execute("COMMIT").await {
            self.rollback().await;
            let err = Error::Ddl {
                statement: sql,
                source,
            };
            return result(Outcome::Failed(err.to_string()), None);
        }

        result(Outcome::Applied, backfill)
    }

    async fn is_satisfied(&self, operation: &DdlOperation) -> Result<bool, Error> {
        match operation {
            DdlOperation::CreateTable(spec) => self.inspector.table_exists(&spec.name).await,
            DdlOperation::AddColumn { table, column } => {
                self.inspector.column_exists(table, &column.name).await
            }
            DdlOperation::AddConstraint { table, constraint } => {
                self.inspector.constraint_exists(table, constraint).await
            }
        }
    }

    async fn rollback(&self) {
        if let Err(e) = self.conn.traced().batch_execute("ROLLBACK").await {
            tracing::warn!(error = %e, "rollback failed");
        }
    }

    /// Backfill inside the operation's transaction, guarded by a savepoint
    /// so a failed UPDATE leaves the added column in place.
    async fn backfill_in_transaction(
        &self,
        table: &str,
        column: &ColumnSpec,
    ) -> Option<BackfillOutcome> {
        let db = self.conn.traced();
        if let Err(e) = db
            .batch_execute(&format!("SAVEPOINT {}", BACKFILL_SAVEPOINT))
            .await
        {
            return Some(self.backfill_failed(table, column, e));
        }

        match self.backfill(table, column).await {
            Some(BackfillOutcome::Failed(reason)) => {
                let undo = format!(
                    "ROLLBACK TO SAVEPOINT {sp}; RELEASE SAVEPOINT {sp}",
                    sp = BACKFILL_SAVEPOINT
                );
                if let Err(e) = db.batch_execute(&undo).await {
                    tracing::warn!(error = %e, "rollback to savepoint failed");
                }
                Some(BackfillOutcome::Failed(reason))
            }
            filled => {
                let release = format!("RELEASE SAVEPOINT {}", BACKFILL_SAVEPOINT);
                if let Err(e) = db.batch_execute(&release).await {
                    return Some(self.backfill_failed(table, column, e));
                }
                filled
            }
        }
    }

    /// Set every NULL in `table.column` to the column's default.
    ///
    /// Returns `None` when the column has no default. Safe to re-run on its
    /// own after a failed backfill.
    pub async fn backfill(&self, table: &str, column: &ColumnSpec) -> Option<BackfillOutcome> {
        let sql = self.conn.dialect().render_backfill(table, column)?;
        match self.conn.traced().execute(&sql, &[]).await {
            Ok(rows) => {
                if rows > 0 {
                    tracing::info!(table, column = %column.name, rows, "backfilled");
                }
                Some(BackfillOutcome::Filled { rows })
            }
            Err(e) => Some(self.backfill_failed(table, column, e)),
        }
    }

    fn backfill_failed(
        &self,
        table: &str,
        column: &ColumnSpec,
        source: crate::error::DbError,
    ) -> BackfillOutcome {
        let err = Error::DataBackfill {
            table: table.to_string(),
            column: column.name.clone(),
            source,
        };
        tracing::warn!(error = %err, "backfill failed");
        BackfillOutcome::Failed(err.to_string())
    }
}
