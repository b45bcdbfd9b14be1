//! Read-Only SQL Guard
//!
//! Keyword-level filter applied before any statement reaches the database.
//! It is deliberately strict: a mutating keyword anywhere in the text,
//! including inside string literals and comments, rejects the statement.
//! The database connection is additionally opened with `readonly=2`.

use analytics_agent_core::{CoreError, CoreResult};

/// Keywords that reject a statement wherever they appear as a whole word.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
    "RENAME", "ATTACH", "DETACH", "OPTIMIZE", "KILL", "OUTFILE",
];

/// Keywords a statement may start with.
pub const ALLOWED_LEADING_KEYWORDS: &[&str] =
    &["SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "EXISTS"];

const REJECTION_HINT: &str =
    "Only SELECT queries are allowed. INSERT/UPDATE/DELETE/DROP are forbidden.";

/// Check that `sql` is a single read-only statement.
///
/// Returns the statement with surrounding whitespace, trailing comments and
/// trailing semicolons removed.
pub fn ensure_read_only(sql: &str) -> CoreResult<String> {
    if sql.trim().is_empty() {
        return Err(CoreError::query_rejected("empty statement"));
    }

    if let Some(keyword) = words(sql)
        .map(|w| w.to_ascii_uppercase())
        .find(|w| FORBIDDEN_KEYWORDS.contains(&w.as_str()))
    {
        return Err(CoreError::query_rejected(format!(
            "{} is not permitted. {}",
            keyword, REJECTION_HINT
        )));
    }

    let masked = mask_literals_and_comments(sql);
    let statement_end = masked.trim_end().trim_end_matches(|c: char| c == ';' || c.is_whitespace()).len();
    let body = &masked[..statement_end];

    if body.contains(';') {
        return Err(CoreError::query_rejected(
            "multiple statements are not permitted",
        ));
    }

    let leading = words(body)
        .next()
        .map(|w| w.to_ascii_uppercase())
        .unwrap_or_default();
    if !ALLOWED_LEADING_KEYWORDS.contains(&leading.as_str()) {
        return Err(CoreError::query_rejected(format!(
            "statement must start with SELECT or WITH (got '{}'). {}",
            leading, REJECTION_HINT
        )));
    }

    let tail: Vec<String> = words(body).map(|w| w.to_ascii_uppercase()).collect();
    if tail.len() >= 2 && tail[tail.len() - 2] == "FORMAT" {
        return Err(CoreError::query_rejected(
            "FORMAT clauses are not supported; results are returned in a fixed format",
        ));
    }

    let start = body.len() - body.trim_start().len();
    Ok(sql[start..statement_end].to_string())
}

/// Append `LIMIT <limit>` to SELECT/WITH statements that have no LIMIT clause.
///
/// Expects a statement already normalized by `ensure_read_only`. Returns the
/// statement and whether a limit was added.
pub fn apply_row_limit(sql: &str, limit: u64) -> (String, bool) {
    let masked = mask_literals_and_comments(sql);
    let mut tokens = words(&masked).map(|w| w.to_ascii_uppercase());
    let leading = tokens.next().unwrap_or_default();
    if leading != "SELECT" && leading != "WITH" {
        return (sql.to_string(), false);
    }
    if tokens.any(|w| w == "LIMIT") {
        return (sql.to_string(), false);
    }
    (format!("{}\nLIMIT {}", sql, limit), true)
}

/// Whole words (`[A-Za-z0-9_]+`) of the text.
fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
}

/// Replace the contents of quoted strings, quoted identifiers and comments
/// with spaces. The result has the same byte length as the input.
fn mask_literals_and_comments(sql: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        Quoted(char),
        LineComment,
        BlockComment,
    }

    let mut out = String::with_capacity(sql.len());
    let mut state = State::Code;
    let mut chars = sql.chars().peekable();

    let blank = |out: &mut String, c: char| {
        if c == '\n' {
            out.push('\n');
        } else {
            out.extend(std::iter::repeat(' ').take(c.len_utf8()));
        }
    };

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '\'' | '"' | '`' => {
                    out.push(c);
                    state = State::Quoted(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::BlockComment;
                }
                _ => out.push(c),
            },
            State::Quoted(quote) => {
                if c == '\\' {
                    blank(&mut out, c);
                    if let Some(escaped) = chars.next() {
                        blank(&mut out, escaped);
                    }
                } else if c == quote {
                    if chars.peek() == Some(&quote) {
                        chars.next();
                        out.push_str("  ");
                    } else {
                        out.push(c);
                        state = State::Code;
                    }
                } else {
                    blank(&mut out, c);
                }
            }
            State::LineComment => {
                blank(&mut out, c);
                if c == '\n' {
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = State::Code;
                } else {
                    blank(&mut out, c);
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(sql: &str) -> bool {
        matches!(ensure_read_only(sql), Err(CoreError::QueryRejected(_)))
    }

    #[test]
    fn test_accepts_plain_select() {
        assert_eq!(
            ensure_read_only("  SELECT region, sum(amount) FROM sales GROUP BY region;  ").unwrap(),
            "SELECT region, sum(amount) FROM sales GROUP BY region"
        );
    }

    #[test]
    fn test_accepts_cte_and_show() {
        assert!(ensure_read_only("WITH t AS (SELECT 1) SELECT * FROM t").is_ok());
        assert!(ensure_read_only("show tables").is_ok());
        assert!(ensure_read_only("DESCRIBE TABLE orders").is_ok());
    }

    #[test]
    fn test_rejects_mutating_keywords_anywhere() {
        for sql in [
            "DROP TABLE orders",
            "drop table orders",
            "INSERT INTO t VALUES (1)",
            "ALTER TABLE t DELETE WHERE 1",
            "TRUNCATE TABLE t",
            "CREATE TABLE x (a Int8) ENGINE = Memory",
            "UPDATE t SET a = 1",
            "SELECT * FROM t; DELETE FROM t",
            "WITH x AS (SELECT 1) INSERT INTO t SELECT * FROM x",
            "SELECT 'drop' AS note",
            "SELECT 1 -- then DROP TABLE t",
            "SELECT * FROM t INTO OUTFILE 'x.csv'",
        ] {
            assert!(rejected(sql), "expected rejection: {}", sql);
        }
    }

    #[test]
    fn test_column_names_containing_keywords_are_fine() {
        assert!(ensure_read_only("SELECT created_at, updated_at, is_deleted FROM users").is_ok());
    }

    #[test]
    fn test_rejects_non_select_and_multiple_statements() {
        assert!(rejected(""));
        assert!(rejected("   "));
        assert!(rejected("SET max_threads = 1"));
        assert!(rejected("SELECT 1; SELECT 2"));
        assert!(rejected("SELECT 1 FORMAT CSV"));
    }

    #[test]
    fn test_semicolon_inside_literal_is_not_a_separator() {
        assert!(ensure_read_only("SELECT 'a;b' AS s").is_ok());
        assert!(ensure_read_only("SELECT 'it''s; fine' AS s;").is_ok());
    }

    #[test]
    fn test_trailing_comment_is_removed() {
        assert_eq!(
            ensure_read_only("SELECT 1 -- total").unwrap(),
            "SELECT 1"
        );
        assert_eq!(
            ensure_read_only("/* head */ SELECT 1 /* tail */").unwrap(),
            "SELECT 1"
        );
    }

    #[test]
    fn test_apply_row_limit() {
        let (sql, added) = apply_row_limit("SELECT * FROM t", 50_000);
        assert!(added);
        assert_eq!(sql, "SELECT * FROM t\nLIMIT 50000");

        let (sql, added) = apply_row_limit("SELECT * FROM t LIMIT 10", 50_000);
        assert!(!added);
        assert_eq!(sql, "SELECT * FROM t LIMIT 10");

        let (_, added) = apply_row_limit("SHOW TABLES", 50_000);
        assert!(!added);

        let (_, added) = apply_row_limit("SELECT 'no limit here' AS s", 10);
        assert!(added);
    }

    #[test]
    fn test_mask_preserves_length() {
        let sql = "SELECT 'héllo' /* ü */ -- ç\nFROM t";
        assert_eq!(mask_literals_and_comments(sql).len(), sql.len());
    }
}
