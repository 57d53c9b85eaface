//! Reconciliation planning: desired specs + snapshot -> ordered DDL.
//!
//! The planner only ever adds. Existing columns whose type or nullability
//! differ from their spec are reported as [`Drift`] and left alone.

use crate::dialect::Dialect;
use crate::error::{DbError, Error};
use crate::introspect::SchemaSnapshot;
use mortar_schema::{ColumnSpec, ForeignKeyRef, TableSpec, UniqueConstraint};
use std::collections::HashSet;
use std::fmt;

/// A constraint added to an existing table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constraint {
    ForeignKey {
        column: String,
        references: ForeignKeyRef,
    },
    Unique(UniqueConstraint),
}

impl Constraint {
    /// The constraint's name on `table`.
    pub fn name(&self, table: &str) -> String {
        match self {
            Constraint::ForeignKey { column, .. } => mortar_sql::foreign_key_name(table, column),
            Constraint::Unique(unique) => unique.name(table),
        }
    }

    /// Columns of the owning table covered by this constraint.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Constraint::ForeignKey { column, .. } => vec![column.as_str()],
            Constraint::Unique(unique) => unique.columns.iter().map(String::as_str).collect(),
        }
    }
}

/// One unit of DDL work.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlOperation {
    CreateTable(TableSpec),
    AddColumn { table: String, column: ColumnSpec },
    AddConstraint { table: String, constraint: Constraint },
}

impl DdlOperation {
    /// The table this operation touches.
    pub fn table(&self) -> &str {
        match self {
            DdlOperation::CreateTable(spec) => &spec.name,
            DdlOperation::AddColumn { table, .. } | DdlOperation::AddConstraint { table, .. } => {
                table
            }
        }
    }

    /// Render the DDL statement for `dialect`.
    pub fn to_sql(&self, dialect: Dialect) -> Result<String, DbError> {
        match self {
            DdlOperation::CreateTable(spec) => Ok(dialect.render_create_table(spec)),
            DdlOperation::AddColumn { table, column } => {
                Ok(dialect.render_add_column(table, column))
            }
            DdlOperation::AddConstraint { table, constraint } => {
                dialect.render_add_constraint(table, constraint)
            }
        }
    }
}

impl fmt::Display for DdlOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DdlOperation::CreateTable(spec) => write!(f, "CREATE TABLE {}", spec.name),
            DdlOperation::AddColumn { table, column } => {
                write!(f, "ADD COLUMN {}.{}", table, column.name)
            }
            DdlOperation::AddConstraint { table, constraint } => {
                write!(f, "ADD CONSTRAINT {} ON {}", constraint.name(table), table)
            }
        }
    }
}

/// What differs between an existing column and its spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftKind {
    Type,
    Nullability,
}

/// An existing column that doesn't match its spec. Reported, never fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub table: String,
    pub column: String,
    pub kind: DriftKind,
    pub expected: String,
    pub observed: String,
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            DriftKind::Type => "type",
            DriftKind::Nullability => "nullability",
        };
        write!(
            f,
            "{}.{}: {} is {}, expected {}",
            self.table, self.column, what, self.observed, self.expected
        )
    }
}

/// The outcome of planning: DDL to run, plus drift to report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub operations: Vec<DdlOperation>,
    pub drift: Vec<Drift>,
}

impl Plan {
    /// Whether there is no DDL to run. Drift doesn't count.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Render every operation for `dialect`.
    ///
    /// Operations the dialect can't express render as a `-- ` comment.
    pub fn to_sql(&self, dialect: Dialect) -> Vec<String> {
        self.operations
            .iter()
            .map(|op| match op.to_sql(dialect) {
                Ok(sql) => sql,
                Err(e) => format!("-- {}: {}", op, e),
            })
            .collect()
    }

    fn extend(&mut self, other: Plan) {
        self.operations.extend(other.operations);
        self.drift.extend(other.drift);
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operations.is_empty() {
            writeln!(f, "No changes detected.")?;
        }
        for op in &self.operations {
            writeln!(f, "  {}", op)?;
        }
        for drift in &self.drift {
            writeln!(f, "  drift: {}", drift)?;
        }
        Ok(())
    }
}

/// Plan one table against a snapshot.
pub fn plan_table(spec: &TableSpec, snapshot: &SchemaSnapshot) -> Result<Plan, Error> {
    let mut plan = Plan::default();

    if !snapshot.has_table(&spec.name) {
        plan.operations.push(DdlOperation::CreateTable(spec.clone()));
        return Ok(plan);
    }

    let mut added: HashSet<&str> = HashSet::new();
    for column in &spec.columns {
        match snapshot.column(&spec.name, &column.name) {
            None => {
                if column.primary_key {
                    return Err(Error::Configuration(format!(
                        "cannot add primary key column {}.{} to an existing table",
                        spec.name, column.name
                    )));
                }
                if !column.is_nullable() && column.default.is_none() {
                    return Err(Error::Configuration(format!(
                        "cannot add NOT NULL column {}.{} without a default",
                        spec.name, column.name
                    )));
                }
                added.insert(&column.name);
                plan.operations.push(DdlOperation::AddColumn {
                    table: spec.name.clone(),
                    column: column.clone(),
                });
            }
            Some(observed) => {
                if let Some(observed_type) = observed.sql_type {
                    if observed_type != column.sql_type {
                        plan.drift.push(Drift {
                            table: spec.name.clone(),
                            column: column.name.clone(),
                            kind: DriftKind::Type,
                            expected: column.sql_type.to_string(),
                            observed: observed.data_type.clone(),
                        });
                    }
                } else {
                    plan.drift.push(Drift {
                        table: spec.name.clone(),
                        column: column.name.clone(),
                        kind: DriftKind::Type,
                        expected: column.sql_type.to_string(),
                        observed: observed.data_type.clone(),
                    });
                }
                if observed.nullable != column.is_nullable() {
                    plan.drift.push(Drift {
                        table: spec.name.clone(),
                        column: column.name.clone(),
                        kind: DriftKind::Nullability,
                        expected: nullability(column.is_nullable()).to_string(),
                        observed: nullability(observed.nullable).to_string(),
                    });
                }
            }
        }
    }

    if !snapshot.dialect.inline_foreign_keys() {
        for (column, fk) in spec.foreign_keys() {
            if added.contains(column.name.as_str()) {
                plan.operations.push(DdlOperation::AddConstraint {
                    table: spec.name.clone(),
                    constraint: Constraint::ForeignKey {
                        column: column.name.clone(),
                        references: fk.clone(),
                    },
                });
            }
        }
    }

    for unique in &spec.unique {
        if unique.columns.iter().any(|c| added.contains(c.as_str())) {
            plan.operations.push(DdlOperation::AddConstraint {
                table: spec.name.clone(),
                constraint: Constraint::Unique(unique.clone()),
            });
        }
    }

    Ok(plan)
}

fn nullability(nullable: bool) -> &'static str {
    if nullable { "NULL" } else { "NOT NULL" }
}

/// Plan a batch of tables.
///
/// Tables are planned in caller order, except that a table waits for every
/// table it references that is created in the same batch.
pub fn plan_all(specs: &[TableSpec], snapshot: &SchemaSnapshot) -> Result<Plan, Error> {
    let in_batch: HashSet<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    let created: HashSet<&str> = specs
        .iter()
        .map(|s| s.name.as_str())
        .filter(|name| !snapshot.has_table(name))
        .collect();

    for spec in specs {
        for target in spec.referenced_tables() {
            if !in_batch.contains(target) && !snapshot.has_table(target) {
                return Err(Error::Configuration(format!(
                    "table '{}' references '{}', which neither exists nor is being created",
                    spec.name, target
                )));
            }
        }
    }

    let mut pending: Vec<&TableSpec> = specs.iter().collect();
    let mut done: HashSet<&str> = HashSet::new();
    let mut plan = Plan::default();

    while !pending.is_empty() {
        let mut progress = false;
        let mut still_pending = Vec::new();

        for spec in pending {
            let ready = spec
                .referenced_tables()
                .into_iter()
                .all(|target| !created.contains(target) || done.contains(target));
            if ready {
                plan.extend(plan_table(spec, snapshot)?);
                done.insert(&spec.name);
                progress = true;
            } else {
                still_pending.push(spec);
            }
        }

        if !progress {
            let names: Vec<&str> = still_pending.iter().map(|s| s.name.as_str()).collect();
            return Err(Error::Configuration(format!(
                "foreign key cycle among tables being created: {}",
                names.join(", ")
            )));
        }
        pending = still_pending;
    }

    Ok(plan)
}
