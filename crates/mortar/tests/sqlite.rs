//! End-to-end reconciliation against in-memory SQLite.

use mortar::{
    BackfillOutcome, BoxFuture, ColumnSpec, Connection, Constraint, DbError, DdlOperation,
    DefaultValue, Dialect, Error, Executor, Inspector, OrphanCleaner, OrphanRef, Outcome, SqlRow,
    SqliteConn, TableSpec, UniqueConstraint,
};

fn assignment() -> TableSpec {
    TableSpec::new("assignment")
        .column(ColumnSpec::id())
        .column(ColumnSpec::string("title", 200).not_null())
        .column(
            ColumnSpec::string("status", 20)
                .not_null()
                .default(DefaultValue::text("Active")),
        )
}

async fn scalar(conn: &impl Connection, sql: &str) -> i64 {
    let rows = conn.query(sql, &[]).await.unwrap();
    rows[0].get_i64(0).unwrap().unwrap()
}

async fn column_names(conn: &impl Connection, table: &str) -> Vec<String> {
    Inspector::new(conn)
        .columns(table)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect()
}

/// Fails every statement containing `marker`, delegating the rest.
struct FailingConn {
    inner: SqliteConn,
    marker: &'static str,
}

impl FailingConn {
    fn injected<'a, T: Send + 'a>(&self, sql: &str) -> Option<BoxFuture<'a, Result<T, DbError>>> {
        if sql.contains(self.marker) {
            let err = DbError::Unsupported(format!("injected failure: {}", sql));
            Some(Box::pin(std::future::ready(Err(err))))
        } else {
            None
        }
    }
}

impl Connection for FailingConn {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a str],
    ) -> BoxFuture<'a, Result<u64, DbError>> {
        self.injected(sql)
            .unwrap_or_else(|| self.inner.execute(sql, params))
    }

    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<(), DbError>> {
        self.injected(sql)
            .unwrap_or_else(|| self.inner.batch_execute(sql))
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<SqlRow>, DbError>> {
        self.injected(sql)
            .unwrap_or_else(|| self.inner.query(sql, params))
    }
}

#[tokio::test]
async fn creates_missing_table() {
    let conn = SqliteConn::open_in_memory().unwrap();

    let plan = mortar::plan(&conn, &[assignment()]).await.unwrap();
    assert_eq!(plan.operations, vec![DdlOperation::CreateTable(assignment())]);

    let report = mortar::reconcile(&conn, &[assignment()]).await.unwrap();
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].outcome, Outcome::Applied);
    assert_eq!(
        column_names(&conn, "assignment").await,
        vec!["id", "title", "status"]
    );
}

#[tokio::test]
async fn adds_column_and_backfills_existing_rows() {
    let conn = SqliteConn::open_in_memory().unwrap();
    conn.batch_execute(
        r#"
        CREATE TABLE "assignment" ("id" INTEGER PRIMARY KEY AUTOINCREMENT, "title" VARCHAR(200) NOT NULL);
        INSERT INTO "assignment" ("title") VALUES ('Essay'), ('Lab report'), ('Quiz');
        "#,
    )
    .await
    .unwrap();

    let plan = mortar::plan(&conn, &[assignment()]).await.unwrap();
    assert_eq!(
        plan.operations,
        vec![DdlOperation::AddColumn {
            table: "assignment".into(),
            column: assignment().columns[2].clone(),
        }]
    );

    let report = mortar::reconcile(&conn, &[assignment()]).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.applied(), 1);
    assert_eq!(
        scalar(
            &conn,
            r#"SELECT COUNT(*) FROM "assignment" WHERE "status" = 'Active'"#
        )
        .await,
        3
    );
}

#[tokio::test]
async fn second_run_changes_nothing() {
    let conn = SqliteConn::open_in_memory().unwrap();
    conn.batch_execute(
        r#"CREATE TABLE "assignment" ("id" INTEGER PRIMARY KEY AUTOINCREMENT, "title" VARCHAR(200) NOT NULL)"#,
    )
    .await
    .unwrap();

    let plan = mortar::plan(&conn, &[assignment()]).await.unwrap();
    let first = Executor::new(&conn).apply(&plan.operations).await;
    assert_eq!(first.applied(), 1);

    // the same operation list again: every unit is already satisfied
    let again = Executor::new(&conn).apply(&plan.operations).await;
    assert_eq!(again.applied(), 0);
    assert_eq!(again.already_satisfied(), 1);

    // and a fresh plan is empty
    assert!(mortar::plan(&conn, &[assignment()]).await.unwrap().is_empty());
    let report = mortar::reconcile(&conn, &[assignment()]).await.unwrap();
    assert!(report.results.is_empty());
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn creates_related_tables_parents_first() {
    let conn = SqliteConn::open_in_memory().unwrap();
    let enrollment = TableSpec::new("enrollment")
        .column(ColumnSpec::id())
        .column(ColumnSpec::integer("student_id").not_null().references("student", "id"))
        .column(ColumnSpec::integer("class_id").not_null().references("class", "id"))
        .unique(["student_id", "class_id"]);
    let student = TableSpec::new("student")
        .column(ColumnSpec::id())
        .column(ColumnSpec::string("name", 80).not_null());
    let class = TableSpec::new("class")
        .column(ColumnSpec::id())
        .column(ColumnSpec::string("name", 80).not_null());

    let report = mortar::reconcile(&conn, &[enrollment, student, class])
        .await
        .unwrap();
    let order: Vec<String> = report
        .results
        .iter()
        .map(|r| r.operation.to_string())
        .collect();
    assert_eq!(
        order,
        vec!["CREATE TABLE student", "CREATE TABLE class", "CREATE TABLE enrollment"]
    );
    assert_eq!(
        scalar(&conn, "SELECT COUNT(*) FROM pragma_foreign_key_list('enrollment')").await,
        2
    );
}

#[tokio::test]
async fn adds_foreign_key_column_inline() {
    let conn = SqliteConn::open_in_memory().unwrap();
    conn.batch_execute(
        r#"
        CREATE TABLE "class" ("id" INTEGER PRIMARY KEY AUTOINCREMENT);
        CREATE TABLE "assignment" ("id" INTEGER PRIMARY KEY AUTOINCREMENT, "title" TEXT);
        "#,
    )
    .await
    .unwrap();

    let spec = TableSpec::new("assignment")
        .column(ColumnSpec::id())
        .column(ColumnSpec::text("title"))
        .column(ColumnSpec::integer("class_id").references("class", "id"));
    let report = mortar::reconcile(&conn, &[spec]).await.unwrap();
    assert_eq!(report.applied(), 1);
    assert_eq!(
        scalar(
            &conn,
            r#"SELECT COUNT(*) FROM pragma_foreign_key_list('assignment') WHERE "table" = 'class'"#
        )
        .await,
        1
    );
}

#[tokio::test]
async fn adds_reference_column_with_default() {
    let conn = SqliteConn::open_in_memory().unwrap();
    conn.batch_execute(
        r#"
        CREATE TABLE "term" ("id" INTEGER PRIMARY KEY AUTOINCREMENT, "name" TEXT);
        INSERT INTO "term" ("id", "name") VALUES (1, 'Fall');
        CREATE TABLE "class" ("id" INTEGER PRIMARY KEY AUTOINCREMENT, "name" TEXT);
        INSERT INTO "class" ("name") VALUES ('Algebra');
        "#,
    )
    .await
    .unwrap();

    let spec = TableSpec::new("class")
        .column(ColumnSpec::id())
        .column(ColumnSpec::text("name"))
        .column(
            ColumnSpec::integer("term_id")
                .not_null()
                .default(DefaultValue::Integer(1))
                .references("term", "id"),
        );

    let report = mortar::reconcile(&conn, &[spec.clone()]).await.unwrap();
    assert!(report.is_success(), "{}", report);
    assert_eq!(report.results[0].outcome, Outcome::Applied);
    assert_eq!(
        report.results[0].backfill,
        Some(BackfillOutcome::Filled { rows: 1 })
    );
    assert_eq!(
        scalar(&conn, r#"SELECT COUNT(*) FROM "class" WHERE "term_id" = 1"#).await,
        1
    );
    assert_eq!(
        scalar(&conn, "SELECT COUNT(*) FROM pragma_foreign_key_list('class')").await,
        1
    );

    let again = mortar::reconcile(&conn, &[spec]).await.unwrap();
    assert!(again.results.is_empty());
}

#[tokio::test]
async fn stale_unique_constraint_is_already_satisfied() {
    let conn = SqliteConn::open_in_memory().unwrap();
    let student_id = ColumnSpec::integer("student_id");
    let grade = TableSpec::new("grade")
        .column(ColumnSpec::id())
        .column(student_id.clone())
        .unique(["student_id"]);
    let report = mortar::reconcile(&conn, &[grade]).await.unwrap();
    assert_eq!(report.applied(), 1);

    // operations planned before the table existed
    let stale = vec![
        DdlOperation::AddColumn {
            table: "grade".into(),
            column: student_id,
        },
        DdlOperation::AddConstraint {
            table: "grade".into(),
            constraint: Constraint::Unique(UniqueConstraint::new(["student_id"])),
        },
    ];
    let again = Executor::new(&conn).apply(&stale).await;
    assert_eq!(again.already_satisfied(), 2);
    assert_eq!(again.applied(), 0);
    assert_eq!(
        scalar(&conn, "SELECT COUNT(*) FROM pragma_index_list('grade')").await,
        1
    );
}

#[tokio::test]
async fn one_failure_does_not_stop_the_rest() {
    let conn = FailingConn {
        inner: SqliteConn::open_in_memory().unwrap(),
        marker: r#"ADD COLUMN "room""#,
    };
    conn.batch_execute(r#"CREATE TABLE "class" ("id" INTEGER PRIMARY KEY AUTOINCREMENT)"#)
        .await
        .unwrap();

    let class = TableSpec::new("class")
        .column(ColumnSpec::id())
        .column(ColumnSpec::text("room"))
        .column(ColumnSpec::integer("capacity").default(DefaultValue::Integer(30)));
    let grade = TableSpec::new("grade")
        .column(ColumnSpec::id())
        .column(ColumnSpec::float("score"));

    let report = mortar::reconcile(&conn, &[class.clone(), grade.clone()])
        .await
        .unwrap();
    let outcomes: Vec<_> = report.results.iter().map(|r| &r.outcome).collect();
    assert!(matches!(outcomes[0], Outcome::Failed(reason) if reason.contains("injected failure")));
    assert_eq!(outcomes[1], &Outcome::Applied);
    assert_eq!(outcomes[2], &Outcome::Applied);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(column_names(&conn.inner, "class").await, vec!["id", "capacity"]);

    // once the fault is gone only the failed unit is left to do
    let report = mortar::reconcile(&conn.inner, &[class, grade]).await.unwrap();
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].operation.to_string(), "ADD COLUMN class.room");
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn failed_backfill_keeps_the_column() {
    let conn = FailingConn {
        inner: SqliteConn::open_in_memory().unwrap(),
        marker: "UPDATE",
    };
    conn.batch_execute(
        r#"
        CREATE TABLE "grade" ("id" INTEGER PRIMARY KEY AUTOINCREMENT, "score" REAL);
        INSERT INTO "grade" ("score") VALUES (91.5), (78.0);
        "#,
    )
    .await
    .unwrap();

    let graded_at = ColumnSpec::timestamp("graded_at")
        .not_null()
        .default(DefaultValue::CurrentTimestamp);
    let spec = TableSpec::new("grade")
        .column(ColumnSpec::id())
        .column(ColumnSpec::float("score"))
        .column(graded_at.clone());

    let report = mortar::reconcile(&conn, &[spec]).await.unwrap();
    let result = &report.results[0];
    assert_eq!(result.outcome, Outcome::Applied);
    assert!(matches!(result.backfill, Some(BackfillOutcome::Failed(_))));
    assert_eq!(report.exit_code(), 1);
    assert_eq!(
        scalar(&conn.inner, r#"SELECT COUNT(*) FROM "grade" WHERE "graded_at" IS NULL"#).await,
        2
    );

    // the backfill can be re-run on its own
    let outcome = Executor::new(&conn.inner).backfill("grade", &graded_at).await;
    assert_eq!(outcome, Some(BackfillOutcome::Filled { rows: 2 }));
    assert_eq!(
        scalar(&conn.inner, r#"SELECT COUNT(*) FROM "grade" WHERE "graded_at" IS NULL"#).await,
        0
    );
}

#[tokio::test]
async fn invalid_specs_fail_before_any_ddl() {
    let conn = SqliteConn::open_in_memory().unwrap();
    let broken = TableSpec::new("attendance")
        .column(ColumnSpec::id())
        .column(ColumnSpec::boolean("present").default(DefaultValue::text("yes")));

    let err = mortar::reconcile(&conn, &[assignment(), broken])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.is_fatal());
    assert!(!Inspector::new(&conn).table_exists("assignment").await.unwrap());
}

#[tokio::test]
async fn not_null_without_default_fails_at_planning() {
    let conn = SqliteConn::open_in_memory().unwrap();
    conn.batch_execute(r#"CREATE TABLE "assignment" ("id" INTEGER PRIMARY KEY AUTOINCREMENT)"#)
        .await
        .unwrap();

    let err = mortar::reconcile(&conn, &[assignment()]).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(column_names(&conn, "assignment").await, vec!["id"]);
}

#[tokio::test]
async fn cleans_dangling_enrollments() {
    let conn = SqliteConn::open_in_memory().unwrap();
    conn.batch_execute(
        r#"
        CREATE TABLE "student" ("id" INTEGER PRIMARY KEY AUTOINCREMENT, "name" TEXT);
        CREATE TABLE "enrollment" (
            "id" INTEGER PRIMARY KEY AUTOINCREMENT,
            "student_id" INTEGER REFERENCES "student" ("id")
        );
        INSERT INTO "student" ("id", "name") VALUES (1, 'Ada'), (2, 'Grace');
        PRAGMA foreign_keys = OFF;
        INSERT INTO "enrollment" ("student_id") VALUES (1), (2), (40), (41), (42);
        PRAGMA foreign_keys = ON;
        "#,
    )
    .await
    .unwrap();

    let refs = [OrphanRef::new("enrollment", "student_id", "student")];
    let cleaner = OrphanCleaner::new(&conn);
    assert_eq!(cleaner.count(&refs).await[&refs[0]], 3);

    let deleted = cleaner.clean(&refs).await;
    assert_eq!(deleted[&refs[0]], 3);
    assert_eq!(scalar(&conn, r#"SELECT COUNT(*) FROM "enrollment""#).await, 2);

    // the parent can now be deleted without tripping the foreign key
    conn.execute(r#"DELETE FROM "enrollment" WHERE "student_id" = 2"#, &[])
        .await
        .unwrap();
    conn.execute(r#"DELETE FROM "student" WHERE "id" = 2"#, &[])
        .await
        .unwrap();
}
