//! Statement Classification by Leading Keyword
//!
//! Cheap, parser-free helpers that look at the first keyword of a SQL statement.
//! They drive the extractor's allow-list, the validator's fast-pass, the
//! post-execution schema resync trigger and the engines' row-returning heuristic.
//!
//! # Strategy
//! - Leading SQL comments (`--` and `/* */`) are ignored
//! - Keywords are compared as whole upper-cased tokens (`SETTINGS` is not `SET`)

/// Keywords a statement may start with to be recognized as SQL by the extractor
pub const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "SET", "ALTER", "BEGIN", "WITH",
    "SHOW", "DESCRIBE", "TRUNCATE", "GRANT", "REVOKE",
];

/// Administrative and DDL keywords that skip schema validation
pub const FAST_PASS_KEYWORDS: &[&str] =
    &["SHOW", "DESCRIBE", "CREATE", "DROP", "ALTER", "TRUNCATE", "GRANT", "REVOKE"];

/// Keywords whose successful execution changes the schema shape
pub const STRUCTURAL_KEYWORDS: &[&str] = &["CREATE", "DROP", "ALTER"];

const TRANSACTION_CONTROL: &[&str] = &["BEGIN", "COMMIT", "ROLLBACK", "START", "END"];

const ROW_RETURNING: &[&str] =
    &["SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "PRAGMA", "VALUES"];

/// Upper-cased first keyword token of `sql`, ignoring whitespace and leading comments.
///
/// Returns an empty string when the statement does not start with a word
/// (e.g. `(SELECT 1)` or pure punctuation).
#[must_use]
pub fn leading_keyword(sql: &str) -> String {
    let stripped = strip_comments(sql);
    stripped
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Check whether the leading keyword of `sql` is one of `keywords`
#[must_use]
pub fn starts_with_any(sql: &str, keywords: &[&str]) -> bool {
    let keyword = leading_keyword(sql);
    !keyword.is_empty() && keywords.contains(&keyword.as_str())
}

/// Statement begins with one of the extractor's recognized SQL keywords
#[must_use]
pub fn is_sql_start(sql: &str) -> bool {
    starts_with_any(sql, SQL_KEYWORDS)
}

/// Statement is administrative or DDL and bypasses schema validation
#[must_use]
pub fn is_fast_pass(sql: &str) -> bool {
    starts_with_any(sql, FAST_PASS_KEYWORDS)
}

/// Session setting (`SET search_path TO x`, `SET NAMES utf8mb4`); names no schema objects
#[must_use]
pub fn is_session_setting(sql: &str) -> bool {
    leading_keyword(sql) == "SET"
}

/// Successful execution of this statement invalidates the schema map
#[must_use]
pub fn is_structural_change(sql: &str) -> bool {
    split_statements(sql).iter().any(|stmt| starts_with_any(stmt, STRUCTURAL_KEYWORDS))
}

/// Bare transaction control (`BEGIN`, `COMMIT`, `ROLLBACK`, ...)
///
/// Engines run every batch inside their own transaction, so these are skipped.
#[must_use]
pub fn is_transaction_control(sql: &str) -> bool {
    let upper = sql.trim().trim_end_matches(';').trim().to_ascii_uppercase();
    match upper.split_whitespace().collect::<Vec<_>>().as_slice() {
        [kw] => TRANSACTION_CONTROL.contains(kw),
        [kw, "TRANSACTION" | "WORK"] => TRANSACTION_CONTROL.contains(kw),
        _ => false,
    }
}

/// Heuristic for drivers that cannot tell up front whether a statement yields rows
#[must_use]
pub fn returns_rows(sql: &str) -> bool {
    starts_with_any(sql, ROW_RETURNING)
}

/// Split a batch on `;` into trimmed, non-empty statements.
///
/// Semicolons inside string literals are not special-cased.
#[must_use]
pub fn split_statements(sql: &str) -> Vec<&str> {
    sql.split(';').map(str::trim).filter(|s| !s.is_empty()).collect()
}

/// Strip SQL comments from a statement
///
/// Handles:
/// - Line comments: -- comment
/// - Block comments: /* comment */
pub fn strip_comments(sql: &str) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '-' if chars.peek() == Some(&'-') => {
                chars.next();
                for ch in chars.by_ref() {
                    if ch == '\n' {
                        result.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for ch in chars.by_ref() {
                    if prev == '*' && ch == '/' {
                        break;
                    }
                    prev = ch;
                }
                result.push(' ');
            }
            _ => result.push(ch),
        }
    }

    result
}
