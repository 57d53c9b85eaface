//! The school application's schema, and loading spec files.

use mortar::{ColumnSpec, DefaultValue, OrphanRef, TableSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A TOML spec file: a list of `[[table]]` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecFile {
    #[serde(default)]
    pub table: Vec<TableSpec>,
}

/// Errors loading a spec file.
#[derive(Debug, thiserror::Error)]
pub enum SpecFileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub fn load_specs(path: &Path) -> Result<Vec<TableSpec>, SpecFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| SpecFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: SpecFile = toml::from_str(&content).map_err(|source| SpecFileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.table)
}

fn created_at() -> ColumnSpec {
    ColumnSpec::timestamp("created_at").default(DefaultValue::CurrentTimestamp)
}

/// Every table of the school application, in dependency order.
pub fn school() -> Vec<TableSpec> {
    vec![
        TableSpec::new("user")
            .column(ColumnSpec::id())
            .column(ColumnSpec::string("username", 80).not_null())
            .column(ColumnSpec::string("email", 120).not_null())
            .column(ColumnSpec::string("password_hash", 255))
            .column(
                ColumnSpec::string("role", 20)
                    .not_null()
                    .default(DefaultValue::text("student")),
            )
            .column(
                ColumnSpec::boolean("is_active")
                    .not_null()
                    .default(DefaultValue::Boolean(true)),
            )
            .column(created_at())
            .unique(["username"])
            .unique(["email"]),
        TableSpec::new("student")
            .column(ColumnSpec::id())
            .column(ColumnSpec::integer("user_id").references("user", "id"))
            .column(ColumnSpec::string("first_name", 100).not_null())
            .column(ColumnSpec::string("last_name", 100).not_null())
            .column(ColumnSpec::string("grade_level", 20))
            .column(ColumnSpec::date("date_of_birth"))
            .column(ColumnSpec::string("phone", 30))
            .column(ColumnSpec::text("address"))
            .column(ColumnSpec::string("emergency_contact", 200))
            .column(created_at())
            .unique(["user_id"]),
        TableSpec::new("class")
            .column(ColumnSpec::id())
            .column(ColumnSpec::string("name", 100).not_null())
            .column(ColumnSpec::string("subject", 100))
            .column(ColumnSpec::text("description"))
            .column(ColumnSpec::integer("teacher_id").references("user", "id"))
            .column(ColumnSpec::string("room", 50))
            .column(ColumnSpec::string("schedule", 200))
            .column(ColumnSpec::integer("max_students").default(DefaultValue::Integer(30)))
            .column(
                ColumnSpec::boolean("is_active")
                    .not_null()
                    .default(DefaultValue::Boolean(true)),
            )
            .column(created_at()),
        TableSpec::new("enrollment")
            .column(ColumnSpec::id())
            .column(ColumnSpec::integer("student_id").not_null().references("student", "id"))
            .column(ColumnSpec::integer("class_id").not_null().references("class", "id"))
            .column(ColumnSpec::timestamp("enrolled_at").default(DefaultValue::CurrentTimestamp))
            .column(
                ColumnSpec::string("status", 20)
                    .not_null()
                    .default(DefaultValue::text("Active")),
            )
            .unique(["student_id", "class_id"]),
        TableSpec::new("assignment")
            .column(ColumnSpec::id())
            .column(ColumnSpec::integer("class_id").references("class", "id"))
            .column(ColumnSpec::string("title", 200).not_null())
            .column(ColumnSpec::text("description"))
            .column(ColumnSpec::timestamp("due_date"))
            .column(ColumnSpec::float("points").default(DefaultValue::Float(100.0)))
            .column(
                ColumnSpec::string("status", 20)
                    .not_null()
                    .default(DefaultValue::text("Active")),
            )
            .column(ColumnSpec::integer("created_by").references("user", "id"))
            .column(created_at()),
        TableSpec::new("submission")
            .column(ColumnSpec::id())
            .column(
                ColumnSpec::integer("assignment_id")
                    .not_null()
                    .references("assignment", "id"),
            )
            .column(ColumnSpec::integer("student_id").not_null().references("student", "id"))
            .column(ColumnSpec::text("content"))
            .column(ColumnSpec::string("file_path", 500))
            .column(ColumnSpec::timestamp("submitted_at").default(DefaultValue::CurrentTimestamp))
            .column(
                ColumnSpec::boolean("is_late")
                    .not_null()
                    .default(DefaultValue::Boolean(false)),
            )
            .unique(["assignment_id", "student_id"]),
        TableSpec::new("grade")
            .column(ColumnSpec::id())
            .column(ColumnSpec::integer("student_id").not_null().references("student", "id"))
            .column(ColumnSpec::integer("assignment_id").references("assignment", "id"))
            .column(ColumnSpec::integer("class_id").references("class", "id"))
            .column(ColumnSpec::float("score"))
            .column(ColumnSpec::float("max_score").default(DefaultValue::Float(100.0)))
            .column(ColumnSpec::string("letter_grade", 5))
            .column(ColumnSpec::text("comments"))
            .column(ColumnSpec::integer("graded_by").references("user", "id"))
            .column(ColumnSpec::timestamp("graded_at").default(DefaultValue::CurrentTimestamp)),
        TableSpec::new("attendance")
            .column(ColumnSpec::id())
            .column(ColumnSpec::integer("student_id").not_null().references("student", "id"))
            .column(ColumnSpec::integer("class_id").not_null().references("class", "id"))
            .column(ColumnSpec::date("date").not_null())
            .column(
                ColumnSpec::string("status", 20)
                    .not_null()
                    .default(DefaultValue::text("Present")),
            )
            .column(ColumnSpec::text("notes"))
            .column(ColumnSpec::integer("recorded_by").references("user", "id"))
            .unique(["student_id", "class_id", "date"]),
        TableSpec::new("message")
            .column(ColumnSpec::id())
            .column(ColumnSpec::integer("sender_id").not_null().references("user", "id"))
            .column(ColumnSpec::integer("recipient_id").references("user", "id"))
            .column(ColumnSpec::string("subject", 200))
            .column(ColumnSpec::text("body"))
            .column(
                ColumnSpec::boolean("is_read")
                    .not_null()
                    .default(DefaultValue::Boolean(false)),
            )
            .column(ColumnSpec::integer("parent_id").references("message", "id"))
            .column(created_at()),
        TableSpec::new("group")
            .column(ColumnSpec::id())
            .column(ColumnSpec::integer("class_id").references("class", "id"))
            .column(ColumnSpec::string("name", 100).not_null())
            .column(ColumnSpec::text("description"))
            .column(ColumnSpec::integer("created_by").references("user", "id"))
            .column(created_at()),
        TableSpec::new("group_member")
            .column(ColumnSpec::id())
            .column(ColumnSpec::integer("group_id").not_null().references("group", "id"))
            .column(ColumnSpec::integer("student_id").not_null().references("student", "id"))
            .column(ColumnSpec::string("role", 20).default(DefaultValue::text("member")))
            .column(ColumnSpec::timestamp("joined_at").default(DefaultValue::CurrentTimestamp))
            .unique(["group_id", "student_id"]),
    ]
}

/// References cleaned before deleting users or students.
pub fn school_orphans() -> Vec<OrphanRef> {
    vec![
        OrphanRef::new("student", "user_id", "user"),
        OrphanRef::new("enrollment", "student_id", "student"),
        OrphanRef::new("submission", "student_id", "student"),
        OrphanRef::new("grade", "student_id", "student"),
        OrphanRef::new("attendance", "student_id", "student"),
        OrphanRef::new("group_member", "student_id", "student"),
        OrphanRef::new("group_member", "group_id", "group"),
        OrphanRef::new("message", "sender_id", "user"),
        OrphanRef::new("message", "recipient_id", "user"),
    ]
}
