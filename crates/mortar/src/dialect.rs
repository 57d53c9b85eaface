//! SQL dialects.
//!
//! All engine-specific SQL lives here: catalog queries, type names, literal
//! spellings and DDL shapes. Everything else asks a [`Dialect`] for text and
//! never branches on the engine itself.

use crate::error::{DbError, Error};
use crate::plan::Constraint;
use crate::traced::SqlRow;
use mortar_schema::{ColumnSpec, DefaultValue, SqlType, TableSpec};
use mortar_sql::{quote_ident, quote_idents};

/// A supported SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

/// A query deciding whether some schema object exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistsQuery {
    /// Returns a single boolean or count.
    Scalar { sql: String, params: Vec<String> },
    /// Returns a listing of names; the object exists when `name` is among
    /// the first column of the returned rows.
    Listing {
        sql: String,
        params: Vec<String>,
        name: String,
    },
}

impl ExistsQuery {
    pub fn sql(&self) -> &str {
        match self {
            ExistsQuery::Scalar { sql, .. } | ExistsQuery::Listing { sql, .. } => sql,
        }
    }

    pub fn params(&self) -> Vec<&str> {
        match self {
            ExistsQuery::Scalar { params, .. } | ExistsQuery::Listing { params, .. } => {
                params.iter().map(String::as_str).collect()
            }
        }
    }

    /// Interpret the rows returned by running this query.
    pub fn evaluate(&self, rows: &[SqlRow]) -> Result<bool, DbError> {
        match self {
            ExistsQuery::Scalar { .. } => match rows.first() {
                Some(row) => Ok(row.get_bool(0)?.unwrap_or(false)),
                None => Ok(false),
            },
            ExistsQuery::Listing { name, .. } => {
                for row in rows {
                    if row.get_str(0)? == Some(name.as_str()) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// A parameterized query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<String>,
}

impl Query {
    pub fn params(&self) -> Vec<&str> {
        self.params.iter().map(String::as_str).collect()
    }
}

impl Dialect {
    /// Resolve a dialect by name.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            other => Err(Error::Configuration(format!(
                "unsupported database dialect '{}' (expected sqlite or postgres)",
                other
            ))),
        }
    }

    /// Resolve a dialect from a connection string's scheme.
    ///
    /// Driver suffixes (`postgresql+psycopg2://`) are ignored.
    pub fn from_url(url: &str) -> Result<Self, Error> {
        let Some((scheme, _)) = url.split_once(':') else {
            return Err(Error::Configuration(format!(
                "connection string has no scheme: {}",
                url
            )));
        };
        let scheme = scheme.split('+').next().unwrap_or(scheme);
        Self::from_name(scheme)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }

    /// Placeholder for the `n`th (1-based) parameter.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{}", n),
            Dialect::Postgres => format!("${}", n),
        }
    }

    // ==================== Catalog queries ====================

    pub fn table_exists_query(&self, table: &str) -> ExistsQuery {
        let sql = match self {
            Dialect::Sqlite => {
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1"
            }
            Dialect::Postgres => {
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name::text = $1)"
            }
        };
        ExistsQuery::Scalar {
            sql: sql.to_string(),
            params: vec![table.to_string()],
        }
    }

    /// On SQLite this lists the table's columns and matches client-side.
    pub fn column_exists_query(&self, table: &str, column: &str) -> ExistsQuery {
        match self {
            Dialect::Sqlite => ExistsQuery::Listing {
                sql: "SELECT name FROM pragma_table_info(?1)".to_string(),
                params: vec![table.to_string()],
                name: column.to_string(),
            },
            Dialect::Postgres => ExistsQuery::Scalar {
                sql: "SELECT EXISTS (SELECT 1 FROM information_schema.columns \
                      WHERE table_schema = current_schema() \
                      AND table_name::text = $1 AND column_name::text = $2)"
                    .to_string(),
                params: vec![table.to_string(), column.to_string()],
            },
        }
    }

    pub fn constraint_exists_query(&self, table: &str, constraint: &Constraint) -> ExistsQuery {
        let name = constraint.name(table);
        match (self, constraint) {
            (Dialect::Sqlite, Constraint::ForeignKey { column, references }) => {
                ExistsQuery::Scalar {
                    sql: "SELECT COUNT(*) FROM pragma_foreign_key_list(?1) \
                          WHERE \"from\" = ?2 AND \"table\" = ?3"
                        .to_string(),
                    params: vec![table.to_string(), column.clone(), references.table.clone()],
                }
            }
            // Inline UNIQUE constraints get `sqlite_autoindex_*` names, so match
            // unique indexes by their column list instead.
            (Dialect::Sqlite, Constraint::Unique(unique)) => ExistsQuery::Listing {
                sql: "SELECT group_concat(col, ',') FROM ( \
                      SELECT il.name AS idx, ii.name AS col \
                      FROM pragma_index_list(?1) AS il, pragma_index_info(il.name) AS ii \
                      WHERE il.\"unique\" = 1 ORDER BY il.name, ii.seqno \
                      ) GROUP BY idx"
                    .to_string(),
                params: vec![table.to_string()],
                name: unique.columns.join(","),
            },
            (Dialect::Postgres, _) => ExistsQuery::Scalar {
                sql: "SELECT EXISTS (SELECT 1 FROM information_schema.table_constraints \
                      WHERE table_schema = current_schema() \
                      AND table_name::text = $1 AND constraint_name::text = $2)"
                    .to_string(),
                params: vec![table.to_string(), name],
            },
        }
    }

    /// Columns of `table` as `(name, type, nullable, default)` rows.
    pub fn columns_query(&self, table: &str) -> Query {
        let sql = match self {
            Dialect::Sqlite => {
                "SELECT name, type, (\"notnull\" = 0 AND pk = 0), dflt_value \
                 FROM pragma_table_info(?1) ORDER BY cid"
            }
            Dialect::Postgres => {
                "SELECT column_name::text, \
                 CASE WHEN character_maximum_length IS NULL THEN data_type::text \
                 ELSE data_type::text || '(' || character_maximum_length::text || ')' END, \
                 is_nullable::text = 'YES', \
                 column_default::text \
                 FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name::text = $1 \
                 ORDER BY ordinal_position"
            }
        };
        Query {
            sql: sql.to_string(),
            params: vec![table.to_string()],
        }
    }

    /// Map a type name reported by the catalog back to a semantic type.
    pub fn observed_type(&self, raw: &str) -> Option<SqlType> {
        let lower = raw.trim().to_ascii_lowercase();

        if let Some(len) = varchar_length(&lower) {
            return Some(SqlType::Varchar(len));
        }

        match self {
            Dialect::Sqlite => {
                // SQLite only records the declared type; mirror its affinity rules
                if lower.contains("int") {
                    Some(SqlType::Integer)
                } else if lower.contains("bool") {
                    Some(SqlType::Boolean)
                } else if lower.contains("real") || lower.contains("floa") || lower.contains("doub")
                {
                    Some(SqlType::Float)
                } else if lower.contains("datetime") || lower.contains("timestamp") {
                    Some(SqlType::Timestamp)
                } else if lower == "date" {
                    Some(SqlType::Date)
                } else if lower.contains("char") || lower.contains("clob") || lower.contains("text")
                {
                    Some(SqlType::Text)
                } else {
                    None
                }
            }
            Dialect::Postgres => match lower.as_str() {
                "integer" | "bigint" | "smallint" => Some(SqlType::Integer),
                "double precision" | "real" | "numeric" => Some(SqlType::Float),
                "boolean" => Some(SqlType::Boolean),
                "text" | "character varying" => Some(SqlType::Text),
                "timestamp without time zone" | "timestamp with time zone" => {
                    Some(SqlType::Timestamp)
                }
                "date" => Some(SqlType::Date),
                _ => None,
            },
        }
    }

    // ==================== Rendering ====================

    /// The column type as spelled by this dialect.
    pub fn render_column_type(&self, column: &ColumnSpec) -> String {
        match column.sql_type {
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::Float => match self {
                Dialect::Sqlite => "REAL".to_string(),
                Dialect::Postgres => "DOUBLE PRECISION".to_string(),
            },
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Varchar(len) => format!("VARCHAR({})", len),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Timestamp => match self {
                Dialect::Sqlite => "DATETIME".to_string(),
                Dialect::Postgres => "TIMESTAMP".to_string(),
            },
            SqlType::Date => "DATE".to_string(),
        }
    }

    /// A default value as spelled by this dialect.
    pub fn render_default(&self, value: &DefaultValue) -> String {
        match (self, value) {
            (Dialect::Sqlite, DefaultValue::Boolean(v)) => {
                let lit = if *v { "1" } else { "0" };
                lit.to_string()
            }
            (Dialect::Postgres, DefaultValue::Boolean(v)) => {
                let lit = if *v { "TRUE" } else { "FALSE" };
                lit.to_string()
            }
            (_, other) => other.to_string(),
        }
    }

    /// Column definition as used inside CREATE TABLE or ADD COLUMN.
    fn render_column_def(&self, column: &ColumnSpec, default: Option<&DefaultValue>) -> String {
        let mut def = quote_ident(&column.name);
        def.push(' ');

        if column.primary_key && column.sql_type == SqlType::Integer {
            def.push_str(match self {
                Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
                Dialect::Postgres => "SERIAL PRIMARY KEY",
            });
            return def;
        }

        def.push_str(&self.render_column_type(column));
        if column.primary_key {
            def.push_str(" PRIMARY KEY");
        } else if !column.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = default {
            def.push_str(" DEFAULT ");
            def.push_str(&self.render_default(default));
        }
        def
    }

    /// `CREATE TABLE` with foreign keys and unique constraints declared inline.
    pub fn render_create_table(&self, table: &TableSpec) -> String {
        let mut parts: Vec<String> = table
            .columns
            .iter()
            .map(|col| format!("    {}", self.render_column_def(col, col.default.as_ref())))
            .collect();

        for (col, fk) in table.foreign_keys() {
            parts.push(format!(
                "    CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_ident(&mortar_sql::foreign_key_name(&table.name, &col.name)),
                quote_ident(&col.name),
                quote_ident(&fk.table),
                quote_ident(&fk.column)
            ));
        }

        for unique in &table.unique {
            parts.push(format!(
                "    CONSTRAINT {} UNIQUE ({})",
                quote_ident(&unique.name(&table.name)),
                quote_idents(&unique.columns)
            ));
        }

        format!(
            "CREATE TABLE {} (\n{}\n)",
            quote_ident(&table.name),
            parts.join(",\n")
        )
    }

    /// Whether a foreign key on an added column is declared inside the
    /// `ADD COLUMN` itself rather than as a separate constraint.
    pub fn inline_foreign_keys(&self) -> bool {
        matches!(self, Dialect::Sqlite)
    }

    /// The default `ADD COLUMN` can carry for `column`, if any.
    ///
    /// SQLite refuses non-constant defaults on columns added to an existing
    /// table, and any non-NULL default on an added `REFERENCES` column while
    /// foreign keys are enforced. The backfill fills existing rows instead.
    pub fn added_default<'c>(&self, column: &'c ColumnSpec) -> Option<&'c DefaultValue> {
        let default = column.default.as_ref()?;
        let supported = match self {
            Dialect::Sqlite => default.is_constant() && column.foreign_key.is_none(),
            Dialect::Postgres => true,
        };
        supported.then_some(default)
    }

    /// `ALTER TABLE ... ADD COLUMN`.
    ///
    /// SQLite can't add constraints afterwards, so a foreign key is declared
    /// inline with `REFERENCES` there.
    pub fn render_add_column(&self, table: &str, column: &ColumnSpec) -> String {
        let default = self.added_default(column);

        let mut column = column.clone();
        if default.is_none() && column.default.is_some() {
            // SQLite rejects NOT NULL without a default; the backfill fills the rows
            column.nullable = true;
        }

        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(table),
            self.render_column_def(&column, default)
        );

        if let (Dialect::Sqlite, Some(fk)) = (self, &column.foreign_key) {
            sql.push_str(&format!(
                " REFERENCES {} ({})",
                quote_ident(&fk.table),
                quote_ident(&fk.column)
            ));
        }
        sql
    }

    /// DDL adding `constraint` to an existing table.
    pub fn render_add_constraint(
        &self,
        table: &str,
        constraint: &Constraint,
    ) -> Result<String, DbError> {
        let name = quote_ident(&constraint.name(table));
        match (self, constraint) {
            (Dialect::Postgres, Constraint::ForeignKey { column, references }) => Ok(format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_ident(table),
                name,
                quote_ident(column),
                quote_ident(&references.table),
                quote_ident(&references.column)
            )),
            (Dialect::Postgres, Constraint::Unique(unique)) => Ok(format!(
                "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
                quote_ident(table),
                name,
                quote_idents(&unique.columns)
            )),
            (Dialect::Sqlite, Constraint::Unique(unique)) => Ok(format!(
                "CREATE UNIQUE INDEX {} ON {} ({})",
                name,
                quote_ident(table),
                quote_idents(&unique.columns)
            )),
            (Dialect::Sqlite, Constraint::ForeignKey { column, .. }) => {
                Err(DbError::Unsupported(format!(
                    "sqlite cannot add a foreign key to existing column {}.{}",
                    table, column
                )))
            }
        }
    }

    /// `UPDATE` filling NULLs in a freshly added column with its default.
    pub fn render_backfill(&self, table: &str, column: &ColumnSpec) -> Option<String> {
        let default = column.default.as_ref()?;
        Some(format!(
            "UPDATE {} SET {} = {} WHERE {} IS NULL",
            quote_ident(table),
            quote_ident(&column.name),
            self.render_default(default),
            quote_ident(&column.name)
        ))
    }

    /// Condition selecting child rows whose foreign key has no parent.
    fn orphan_condition(
        &self,
        fk_column: &str,
        parent_table: &str,
        parent_column: &str,
    ) -> String {
        format!(
            "{fk} IS NOT NULL AND {fk} NOT IN (SELECT {pc} FROM {pt} WHERE {pc} IS NOT NULL)",
            fk = quote_ident(fk_column),
            pc = quote_ident(parent_column),
            pt = quote_ident(parent_table)
        )
    }

    pub fn orphan_count_sql(
        &self,
        child_table: &str,
        fk_column: &str,
        parent_table: &str,
        parent_column: &str,
    ) -> String {
        format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_ident(child_table),
            self.orphan_condition(fk_column, parent_table, parent_column)
        )
    }

    pub fn orphan_delete_sql(
        &self,
        child_table: &str,
        fk_column: &str,
        parent_table: &str,
        parent_column: &str,
    ) -> String {
        format!(
            "DELETE FROM {} WHERE {}",
            quote_ident(child_table),
            self.orphan_condition(fk_column, parent_table, parent_column)
        )
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse `varchar(20)` / `character varying(20)` into the length.
fn varchar_length(lower: &str) -> Option<u32> {
    let rest = lower
        .strip_prefix("varchar")
        .or_else(|| lower.strip_prefix("character varying"))?;
    let inner = rest.trim().strip_prefix('(')?.strip_suffix(')')?;
    inner.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traced::SqlValue;
    use mortar_schema::UniqueConstraint;

    fn enrollment() -> TableSpec {
        TableSpec::new("enrollment")
            .column(ColumnSpec::id())
            .column(ColumnSpec::integer("student_id").not_null().references("student", "id"))
            .column(ColumnSpec::boolean("active").not_null().default(DefaultValue::Boolean(true)))
            .unique(["student_id"])
    }

    #[test]
    fn test_from_name_and_url() {
        assert_eq!(Dialect::from_name("SQLite").unwrap(), Dialect::Sqlite);
        assert_eq!(Dialect::from_name("postgresql").unwrap(), Dialect::Postgres);
        assert_eq!(
            Dialect::from_url("postgresql+psycopg2://u:p@localhost/school").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(Dialect::from_url("sqlite:///school.db").unwrap(), Dialect::Sqlite);
        assert_eq!(Dialect::from_url("sqlite::memory:").unwrap(), Dialect::Sqlite);
    }

    #[test]
    fn test_unsupported_dialect_is_configuration_error() {
        let err = Dialect::from_url("mysql://root@localhost/school").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("mysql"));

        assert!(matches!(
            Dialect::from_url("no-scheme-here"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Sqlite.placeholder(2), "?2");
        assert_eq!(Dialect::Postgres.placeholder(2), "$2");
    }

    #[test]
    fn test_type_names_differ_per_dialect() {
        let score = ColumnSpec::float("score");
        assert_eq!(Dialect::Sqlite.render_column_type(&score), "REAL");
        assert_eq!(Dialect::Postgres.render_column_type(&score), "DOUBLE PRECISION");

        let at = ColumnSpec::timestamp("submitted_at");
        assert_eq!(Dialect::Sqlite.render_column_type(&at), "DATETIME");
        assert_eq!(Dialect::Postgres.render_column_type(&at), "TIMESTAMP");

        let name = ColumnSpec::string("name", 80);
        assert_eq!(Dialect::Sqlite.render_column_type(&name), "VARCHAR(80)");
    }

    #[test]
    fn test_boolean_defaults() {
        let t = DefaultValue::Boolean(true);
        let f = DefaultValue::Boolean(false);
        assert_eq!(Dialect::Sqlite.render_default(&t), "1");
        assert_eq!(Dialect::Sqlite.render_default(&f), "0");
        assert_eq!(Dialect::Postgres.render_default(&t), "TRUE");
        assert_eq!(Dialect::Postgres.render_default(&f), "FALSE");
        assert_eq!(
            Dialect::Postgres.render_default(&DefaultValue::text("it's")),
            "'it''s'"
        );
    }

    #[test]
    fn test_create_table_sqlite() {
        insta::assert_snapshot!(Dialect::Sqlite.render_create_table(&enrollment()), @r#"
        CREATE TABLE "enrollment" (
            "id" INTEGER PRIMARY KEY AUTOINCREMENT,
            "student_id" INTEGER NOT NULL,
            "active" BOOLEAN NOT NULL DEFAULT 1,
            CONSTRAINT "enrollment_student_id_fkey" FOREIGN KEY ("student_id") REFERENCES "student" ("id"),
            CONSTRAINT "enrollment_student_id_key" UNIQUE ("student_id")
        )
        "#);
    }

    #[test]
    fn test_create_table_postgres() {
        insta::assert_snapshot!(Dialect::Postgres.render_create_table(&enrollment()), @r#"
        CREATE TABLE "enrollment" (
            "id" SERIAL PRIMARY KEY,
            "student_id" INTEGER NOT NULL,
            "active" BOOLEAN NOT NULL DEFAULT TRUE,
            CONSTRAINT "enrollment_student_id_fkey" FOREIGN KEY ("student_id") REFERENCES "student" ("id"),
            CONSTRAINT "enrollment_student_id_key" UNIQUE ("student_id")
        )
        "#);
    }

    #[test]
    fn test_add_column() {
        let status = ColumnSpec::string("status", 20)
            .not_null()
            .default(DefaultValue::text("Active"));
        assert_eq!(
            Dialect::Postgres.render_add_column("assignment", &status),
            r#"ALTER TABLE "assignment" ADD COLUMN "status" VARCHAR(20) NOT NULL DEFAULT 'Active'"#
        );

        let class_id = ColumnSpec::integer("class_id").references("class", "id");
        assert_eq!(
            Dialect::Postgres.render_add_column("assignment", &class_id),
            r#"ALTER TABLE "assignment" ADD COLUMN "class_id" INTEGER"#
        );
        assert_eq!(
            Dialect::Sqlite.render_add_column("assignment", &class_id),
            r#"ALTER TABLE "assignment" ADD COLUMN "class_id" INTEGER REFERENCES "class" ("id")"#
        );
    }

    #[test]
    fn test_sqlite_add_column_drops_non_constant_default() {
        let created = ColumnSpec::timestamp("created_at")
            .not_null()
            .default(DefaultValue::CurrentTimestamp);
        assert_eq!(
            Dialect::Sqlite.render_add_column("grade", &created),
            r#"ALTER TABLE "grade" ADD COLUMN "created_at" DATETIME"#
        );
        assert_eq!(
            Dialect::Postgres.render_add_column("grade", &created),
            r#"ALTER TABLE "grade" ADD COLUMN "created_at" TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP"#
        );
        assert_eq!(
            Dialect::Sqlite.render_backfill("grade", &created).unwrap(),
            r#"UPDATE "grade" SET "created_at" = CURRENT_TIMESTAMP WHERE "created_at" IS NULL"#
        );
    }

    #[test]
    fn test_sqlite_add_reference_column_drops_default() {
        let term_id = ColumnSpec::integer("term_id")
            .not_null()
            .default(DefaultValue::Integer(1))
            .references("term", "id");
        assert_eq!(
            Dialect::Sqlite.render_add_column("class", &term_id),
            r#"ALTER TABLE "class" ADD COLUMN "term_id" INTEGER REFERENCES "term" ("id")"#
        );
        assert_eq!(
            Dialect::Postgres.render_add_column("class", &term_id),
            r#"ALTER TABLE "class" ADD COLUMN "term_id" INTEGER NOT NULL DEFAULT 1"#
        );
        assert_eq!(
            Dialect::Sqlite.render_backfill("class", &term_id).unwrap(),
            r#"UPDATE "class" SET "term_id" = 1 WHERE "term_id" IS NULL"#
        );
    }

    #[test]
    fn test_add_constraint() {
        let fk = Constraint::ForeignKey {
            column: "student_id".into(),
            references: mortar_schema::ForeignKeyRef {
                table: "student".into(),
                column: "id".into(),
            },
        };
        assert_eq!(
            Dialect::Postgres.render_add_constraint("grade", &fk).unwrap(),
            r#"ALTER TABLE "grade" ADD CONSTRAINT "grade_student_id_fkey" FOREIGN KEY ("student_id") REFERENCES "student" ("id")"#
        );
        assert!(matches!(
            Dialect::Sqlite.render_add_constraint("grade", &fk),
            Err(DbError::Unsupported(_))
        ));

        let unique = Constraint::Unique(UniqueConstraint::new(["student_id", "assignment_id"]));
        assert_eq!(
            Dialect::Sqlite.render_add_constraint("grade", &unique).unwrap(),
            r#"CREATE UNIQUE INDEX "grade_student_id_assignment_id_key" ON "grade" ("student_id", "assignment_id")"#
        );
        assert_eq!(
            Dialect::Postgres.render_add_constraint("grade", &unique).unwrap(),
            r#"ALTER TABLE "grade" ADD CONSTRAINT "grade_student_id_assignment_id_key" UNIQUE ("student_id", "assignment_id")"#
        );
    }

    #[test]
    fn test_no_backfill_without_default() {
        assert_eq!(
            Dialect::Sqlite.render_backfill("grade", &ColumnSpec::text("comment")),
            None
        );
    }

    #[test]
    fn test_orphan_sql() {
        insta::assert_snapshot!(
            Dialect::Sqlite.orphan_delete_sql("enrollment", "student_id", "student", "id"),
            @r#"DELETE FROM "enrollment" WHERE "student_id" IS NOT NULL AND "student_id" NOT IN (SELECT "id" FROM "student" WHERE "id" IS NOT NULL)"#
        );
    }

    #[test]
    fn test_observed_types() {
        assert_eq!(Dialect::Sqlite.observed_type("VARCHAR(20)"), Some(SqlType::Varchar(20)));
        assert_eq!(Dialect::Sqlite.observed_type("INTEGER"), Some(SqlType::Integer));
        assert_eq!(Dialect::Sqlite.observed_type("DATETIME"), Some(SqlType::Timestamp));
        assert_eq!(Dialect::Sqlite.observed_type("REAL"), Some(SqlType::Float));
        assert_eq!(Dialect::Sqlite.observed_type("BOOLEAN"), Some(SqlType::Boolean));
        assert_eq!(Dialect::Sqlite.observed_type("BLOB"), None);
        assert_eq!(
            Dialect::Postgres.observed_type("character varying(120)"),
            Some(SqlType::Varchar(120))
        );
        assert_eq!(
            Dialect::Postgres.observed_type("double precision"),
            Some(SqlType::Float)
        );
        assert_eq!(
            Dialect::Postgres.observed_type("timestamp without time zone"),
            Some(SqlType::Timestamp)
        );
    }

    #[test]
    fn test_exists_query_evaluation() {
        let listing = Dialect::Sqlite.column_exists_query("assignment", "status");
        let rows = vec![
            SqlRow::new(vec![SqlValue::Text("id".into())]),
            SqlRow::new(vec![SqlValue::Text("status".into())]),
        ];
        assert!(listing.evaluate(&rows).unwrap());
        assert!(!listing.evaluate(&rows[..1]).unwrap());

        let scalar = Dialect::Postgres.table_exists_query("assignment");
        assert_eq!(scalar.params(), vec!["assignment"]);
        assert!(scalar
            .evaluate(&[SqlRow::new(vec![SqlValue::Boolean(true)])])
            .unwrap());
        assert!(!Dialect::Sqlite
            .table_exists_query("assignment")
            .evaluate(&[SqlRow::new(vec![SqlValue::Integer(0)])])
            .unwrap());
    }
}
