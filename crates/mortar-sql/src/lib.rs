//! SQL quoting and naming primitives.
//!
//! Everything mortar renders goes through these helpers, so identifiers are
//! always quoted the same way and constraint names are stable across runs.
//! Both SQLite and PostgreSQL accept double-quoted identifiers and
//! single-quoted string literals with doubled quotes, so these are
//! dialect-neutral.

/// Longest identifier PostgreSQL keeps before silently truncating.
pub const IDENT_MAX: usize = 63;

/// A SQL string literal wrapper.
///
/// Display writes the value escaped and quoted with single quotes.
///
/// # Example
/// ```
/// use mortar_sql::Lit;
/// assert_eq!(format!("{}", Lit("foo")), "'foo'");
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'")?;
        for c in self.0.as_ref().chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "'")
    }
}

/// A SQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use mortar_sql::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Quote an identifier.
///
/// Always quotes identifiers to avoid issues with reserved keywords like
/// `user`, `order`, `class`, `group`, etc. Doubles any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Quote a comma-separated column list.
pub fn quote_idents(names: &[impl AsRef<str>]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Name of the foreign key constraint on `table.column`.
///
/// Follows PostgreSQL's own convention, `{table}_{column}_fkey`, so a
/// constraint created by hand with default naming is recognized as present.
///
/// # Examples
///
/// ```
/// assert_eq!(mortar_sql::foreign_key_name("enrollment", "student_id"), "enrollment_student_id_fkey");
/// ```
pub fn foreign_key_name(table: &str, column: &str) -> String {
    fit_identifier(&format!("{}_{}_fkey", table, column))
}

/// Name of the unique constraint over `columns` of `table`.
///
/// Uses PostgreSQL's default `{table}_{columns}_key`.
///
/// # Examples
///
/// ```
/// assert_eq!(mortar_sql::unique_constraint_name("user", &["email"]), "user_email_key");
/// assert_eq!(
///     mortar_sql::unique_constraint_name("grade", &["student_id", "assignment_id"]),
///     "grade_student_id_assignment_id_key"
/// );
/// ```
pub fn unique_constraint_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    let cols: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    fit_identifier(&format!("{}_{}_key", table, cols.join("_")))
}

/// Shorten `name` to at most [`IDENT_MAX`] bytes.
///
/// Names that already fit are returned unchanged. Longer names keep a prefix
/// and gain a stable hash suffix, so two long names sharing a prefix don't
/// collide after truncation and the stored name matches what we look up.
pub fn fit_identifier(name: &str) -> String {
    if name.len() <= IDENT_MAX {
        return name.to_string();
    }

    let hex = blake3::hash(name.as_bytes()).to_hex().to_string();
    let suffix = &hex[..16];

    // "_" between prefix and suffix
    let mut len = IDENT_MAX - suffix.len() - 1;
    while len > 0 && !name.is_char_boundary(len) {
        len -= 1;
    }

    format!("{}_{}", &name[..len], suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_reserved_words() {
        assert_eq!(quote_ident("class"), "\"class\"");
        assert_eq!(quote_ident("group"), "\"group\"");
    }

    #[test]
    fn test_quote_idents_list() {
        insta::assert_snapshot!(quote_idents(&["student_id", "class_id"]), @r#""student_id", "class_id""#);
    }

    #[test]
    fn test_literal_doubles_quotes() {
        assert_eq!(Lit("O'Brien").to_string(), "'O''Brien'");
        assert_eq!(Lit("").to_string(), "''");
    }

    #[test]
    fn test_short_names_unchanged() {
        assert_eq!(
            foreign_key_name("submission", "assignment_id"),
            "submission_assignment_id_fkey"
        );
    }

    #[test]
    fn test_long_names_fit_and_are_stable() {
        let table = "a_really_long_table_name_for_group_assignment_submissions";
        let name = foreign_key_name(table, "another_long_column_name_id");
        assert_eq!(name.len(), IDENT_MAX);
        assert_eq!(name, foreign_key_name(table, "another_long_column_name_id"));

        let other = foreign_key_name(table, "another_long_column_name_id2");
        assert_ne!(name, other);
    }

    #[test]
    fn test_fit_identifier_respects_char_boundaries() {
        let name = "é".repeat(40);
        let fitted = fit_identifier(&name);
        assert!(fitted.len() <= IDENT_MAX);
    }
}
