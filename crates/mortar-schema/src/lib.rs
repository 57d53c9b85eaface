//! Desired-schema types for mortar.
//!
//! A [`TableSpec`] describes the end state one table should reach. It is a
//! plain value: built in code (usually with the builder methods below) or
//! deserialized from a spec file, handed to the planner, and dropped. Nothing
//! here talks to a database.
//!
//! ## Example
//!
//! ```
//! use mortar_schema::{ColumnSpec, DefaultValue, TableSpec};
//!
//! let assignment = TableSpec::new("assignment")
//!     .column(ColumnSpec::id())
//!     .column(ColumnSpec::string("title", 200).not_null())
//!     .column(
//!         ColumnSpec::string("status", 20)
//!             .not_null()
//!             .default(DefaultValue::text("Active")),
//!     )
//!     .column(ColumnSpec::integer("class_id").references("class", "id"));
//!
//! assert!(assignment.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub use mortar_sql::{foreign_key_name, unique_constraint_name};


/// Semantic column types.
///
/// Dialects map these to concrete type names; the schema itself never
/// mentions engine-specific spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    /// Whole numbers
    Integer,
    /// Floating point numbers
    Float,
    /// true/false
    Boolean,
    /// Bounded-length string
    #[serde(rename = "string")]
    Varchar(u32),
    /// Unbounded text
    Text,
    /// Date and time, no time zone
    Timestamp,
    /// Calendar date
    Date,
}

impl SqlType {
    /// Whether `default` is a sensible default for a column of this type.
    pub fn accepts(&self, default: &DefaultValue) -> bool {
        match (self, default) {
            (SqlType::Integer, DefaultValue::Integer(_)) => true,
            (SqlType::Float, DefaultValue::Integer(_) | DefaultValue::Float(_)) => true,
            (SqlType::Boolean, DefaultValue::Boolean(_)) => true,
            (SqlType::Varchar(_) | SqlType::Text, DefaultValue::Text(_)) => true,
            (SqlType::Timestamp | SqlType::Date, DefaultValue::Text(_)) => true,
            (SqlType::Timestamp | SqlType::Date, DefaultValue::CurrentTimestamp) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Integer => write!(f, "integer"),
            SqlType::Float => write!(f, "float"),
            SqlType::Boolean => write!(f, "boolean"),
            SqlType::Varchar(len) => write!(f, "string({})", len),
            SqlType::Text => write!(f, "text"),
            SqlType::Timestamp => write!(f, "timestamp"),
            SqlType::Date => write!(f, "date"),
        }
    }
}

/// A column default.
///
/// In spec files a default is written as a bare TOML value (`0`, `1.5`,
/// `true`, `"Active"`); the string `"CURRENT_TIMESTAMP"` means the current
/// time at insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDefault", into = "RawDefault")]
pub enum DefaultValue {
    /// Integer literal
    Integer(i64),
    /// Float literal
    Float(f64),
    /// Boolean literal; dialects differ on how they spell it
    Boolean(bool),
    /// String literal
    Text(String),
    /// `CURRENT_TIMESTAMP`, evaluated by the database
    CurrentTimestamp,
}

impl DefaultValue {
    /// Convenience constructor for text defaults.
    pub fn text(value: impl Into<String>) -> Self {
        DefaultValue::Text(value.into())
    }

    /// Whether the value is a constant (as opposed to evaluated per row).
    pub fn is_constant(&self) -> bool {
        !matches!(self, DefaultValue::CurrentTimestamp)
    }
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Integer(v) => write!(f, "{}", v),
            DefaultValue::Float(v) => write!(f, "{}", v),
            DefaultValue::Boolean(v) => write!(f, "{}", v),
            DefaultValue::Text(v) => write!(f, "{}", mortar_sql::Lit(v)),
            DefaultValue::CurrentTimestamp => write!(f, "CURRENT_TIMESTAMP"),
        }
    }
}

const CURRENT_TIMESTAMP: &str = "CURRENT_TIMESTAMP";

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawDefault {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<RawDefault> for DefaultValue {
    fn from(raw: RawDefault) -> Self {
        match raw {
            RawDefault::Boolean(v) => DefaultValue::Boolean(v),
            RawDefault::Integer(v) => DefaultValue::Integer(v),
            RawDefault::Float(v) => DefaultValue::Float(v),
            RawDefault::Text(v) if v == CURRENT_TIMESTAMP => DefaultValue::CurrentTimestamp,
            RawDefault::Text(v) => DefaultValue::Text(v),
        }
    }
}

impl From<DefaultValue> for RawDefault {
    fn from(value: DefaultValue) -> Self {
        match value {
            DefaultValue::Boolean(v) => RawDefault::Boolean(v),
            DefaultValue::Integer(v) => RawDefault::Integer(v),
            DefaultValue::Float(v) => RawDefault::Float(v),
            DefaultValue::Text(v) => RawDefault::Text(v),
            DefaultValue::CurrentTimestamp => RawDefault::Text(CURRENT_TIMESTAMP.to_string()),
        }
    }
}

/// The parent side of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referenced table
    pub table: String,
    /// Referenced column
    #[serde(default = "default_parent_column")]
    pub column: String,
}

fn default_parent_column() -> String {
    "id".to_string()
}

impl fmt::Display for ForeignKeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// The desired definition of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name, unique within its table
    pub name: String,
    /// Semantic type
    #[serde(rename = "type")]
    pub sql_type: SqlType,
    /// Whether the column allows NULL
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Default applied to new rows, and backfilled into existing rows when
    /// the column is added to a populated table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Parent this column points at, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKeyRef>,
    /// Whether this is the table's primary key
    #[serde(default)]
    pub primary_key: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSpec {
    /// A nullable column with no default.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            default: None,
            foreign_key: None,
            primary_key: false,
        }
    }

    /// The conventional `id INTEGER` primary key.
    pub fn id() -> Self {
        Self::integer("id").primary_key()
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Boolean)
    }

    pub fn string(name: impl Into<String>, len: u32) -> Self {
        Self::new(name, SqlType::Varchar(len))
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Text)
    }

    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Timestamp)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Date)
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the column default.
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Point the column at `table.column`.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKeyRef {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// Mark the column as primary key (implies NOT NULL).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Whether the column may hold NULL, taking the primary key into account.
    pub fn is_nullable(&self) -> bool {
        self.nullable && !self.primary_key
    }
}

impl fmt::Display for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.sql_type)?;
        if self.primary_key {
            write!(f, " [PK]")?;
        } else if !self.nullable {
            write!(f, " [NOT NULL]")?;
        }
        if let Some(default) = &self.default {
            write!(f, " = {}", default)?;
        }
        if let Some(fk) = &self.foreign_key {
            write!(f, " -> {}", fk)?;
        }
        Ok(())
    }
}

/// A unique constraint over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueConstraint {
    /// Constrained columns, in order
    pub columns: Vec<String>,
}

impl UniqueConstraint {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// The constraint name on `table`.
    pub fn name(&self, table: &str) -> String {
        unique_constraint_name(table, &self.columns)
    }
}

/// The desired end state of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Table name
    pub name: String,
    /// Columns in declaration order
    #[serde(rename = "column", default)]
    pub columns: Vec<ColumnSpec>,
    /// Unique constraints in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique: Vec<UniqueConstraint>,
}

impl TableSpec {
    /// A table with no columns yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            unique: Vec::new(),
        }
    }

    /// Append a column.
    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Append a unique constraint.
    pub fn unique<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique.push(UniqueConstraint::new(columns));
        self
    }

    /// Look up a column by name.
    pub fn find_column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns that carry a foreign key, in declaration order.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&ColumnSpec, &ForeignKeyRef)> {
        self.columns
            .iter()
            .filter_map(|c| c.foreign_key.as_ref().map(|fk| (c, fk)))
    }

    /// Tables this one points at, excluding itself, without duplicates.
    pub fn referenced_tables(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.foreign_keys()
            .map(|(_, fk)| fk.table.as_str())
            .filter(|t| *t != self.name && seen.insert(*t))
            .collect()
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.trim().is_empty() {
            return Err(SpecError::EmptyTableName);
        }
        if self.columns.is_empty() {
            return Err(SpecError::NoColumns {
                table: self.name.clone(),
            });
        }

        let mut names = HashSet::new();
        let mut primary_keys = 0;
        for col in &self.columns {
            if col.name.trim().is_empty() {
                return Err(SpecError::EmptyColumnName {
                    table: self.name.clone(),
                });
            }
            if !names.insert(col.name.as_str()) {
                return Err(SpecError::DuplicateColumn {
                    table: self.name.clone(),
                    column: col.name.clone(),
                });
            }
            if let SqlType::Varchar(0) = col.sql_type {
                return Err(SpecError::ZeroLength {
                    table: self.name.clone(),
                    column: col.name.clone(),
                });
            }
            if let Some(default) = &col.default {
                if let DefaultValue::Float(v) = default {
                    if !v.is_finite() {
                        return Err(SpecError::NonFiniteDefault {
                            table: self.name.clone(),
                            column: col.name.clone(),
                        });
                    }
                }
                if !col.sql_type.accepts(default) {
                    return Err(SpecError::DefaultTypeMismatch {
                        table: self.name.clone(),
                        column: col.name.clone(),
                        sql_type: col.sql_type,
                        default: default.to_string(),
                    });
                }
            }
            if let Some(fk) = &col.foreign_key {
                if fk.table.trim().is_empty() || fk.column.trim().is_empty() {
                    return Err(SpecError::EmptyForeignKey {
                        table: self.name.clone(),
                        column: col.name.clone(),
                    });
                }
            }
            if col.primary_key {
                primary_keys += 1;
            }
        }
        if primary_keys > 1 {
            return Err(SpecError::MultiplePrimaryKeys {
                table: self.name.clone(),
            });
        }

        for unique in &self.unique {
            if unique.columns.is_empty() {
                return Err(SpecError::EmptyUnique {
                    table: self.name.clone(),
                });
            }
            if let Some(missing) = unique.columns.iter().find(|c| !names.contains(c.as_str())) {
                return Err(SpecError::UnknownUniqueColumn {
                    table: self.name.clone(),
                    column: missing.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Validate a batch of specs: each one individually, plus unique table names.
pub fn validate_all(specs: &[TableSpec]) -> Result<(), SpecError> {
    let mut seen = HashSet::new();
    for spec in specs {
        spec.validate()?;
        if !seen.insert(spec.name.as_str()) {
            return Err(SpecError::DuplicateTable {
                table: spec.name.clone(),
            });
        }
    }
    Ok(())
}

/// A malformed [`TableSpec`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpecError {
    #[error("table name is empty")]
    EmptyTableName,

    #[error("table '{table}' declares no columns")]
    NoColumns { table: String },

    #[error("table '{table}' has a column with an empty name")]
    EmptyColumnName { table: String },

    #[error("column '{table}.{column}' is declared more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("table '{table}' is declared more than once")]
    DuplicateTable { table: String },

    #[error("column '{table}.{column}' is a string of length 0")]
    ZeroLength { table: String, column: String },

    #[error("column '{table}.{column}' of type {sql_type} cannot default to {default}")]
    DefaultTypeMismatch {
        table: String,
        column: String,
        sql_type: SqlType,
        default: String,
    },

    #[error("column '{table}.{column}' defaults to a float that is not finite")]
    NonFiniteDefault { table: String, column: String },

    #[error("column '{table}.{column}' has an incomplete foreign key")]
    EmptyForeignKey { table: String, column: String },

    #[error("table '{table}' declares more than one primary key column")]
    MultiplePrimaryKeys { table: String },

    #[error("table '{table}' has a unique constraint with no columns")]
    EmptyUnique { table: String },

    #[error("unique constraint on '{table}' names unknown column '{column}'")]
    UnknownUniqueColumn { table: String, column: String },
}
