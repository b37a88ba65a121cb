//! Static Schema Validation
//!
//! Checks the tables and columns a SQL batch references against the current
//! [`SchemaMap`] before anything reaches the database. A failed check is a value
//! ([`Violation`]), not an error: the caller turns it into retry context.
//!
//! # Strategy
//! 1. Fast-pass: administrative and DDL batches are accepted unchecked
//! 2. Parse with `sqlparser` in the connected engine's dialect
//! 3. Every referenced table must exist (CTEs and table functions excluded)
//! 4. Every column reference must resolve:
//!    - `t.c`: `t` through aliases; unknown qualifiers are not flagged
//!    - `c`: a column of any referenced table, or a select-list alias
//!
//! Parse failures are decided by [`ParseFailurePolicy`].

mod refs;
pub mod plot;

pub use plot::validate_plot;

use serde::{Deserialize, Serialize};
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use thiserror::Error;

use crate::engine::DatabaseType;
use crate::schema::SchemaMap;
use crate::statement;
use refs::References;

/// Why a batch was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("Table '{table}' does not exist.")]
    UnknownTable { table: String },

    #[error("{}", unknown_column_message(.column, .table.as_deref()))]
    UnknownColumn { column: String, table: Option<String> },

    #[error("Could not parse SQL structure. {0}")]
    ParseFailed(String),
}

fn unknown_column_message(column: &str, table: Option<&str>) -> String {
    match table {
        Some(table) => format!("Column '{column}' not found in table '{table}'."),
        None => format!("Column '{column}' not found in the queried tables."),
    }
}

/// Accepted outcome of a check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Administrative or DDL batch, not inspected
    FastPass,
    /// Every table and column resolved
    Valid,
    /// SQL did not parse; accepted under [`ParseFailurePolicy::Lenient`]
    ParseFailureAccepted(String),
}

/// What to do with SQL the parser cannot read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ParseFailurePolicy {
    /// Accept and let the database be the judge
    #[default]
    Lenient,
    /// Reject as a violation
    Strict,
}

/// Schema validator bound to a SQL dialect and parse-failure policy
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator {
    engine: Option<DatabaseType>,
    policy: ParseFailurePolicy,
}

impl SchemaValidator {
    /// Generic dialect, lenient parse failures
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse in the dialect of `engine`
    #[must_use]
    pub fn for_engine(engine: DatabaseType) -> Self {
        Self { engine: Some(engine), ..Self::default() }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ParseFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn policy(&self) -> ParseFailurePolicy {
        self.policy
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        match self.engine {
            Some(DatabaseType::Postgres) => Box::new(PostgreSqlDialect {}),
            Some(DatabaseType::MySQL) => Box::new(MySqlDialect {}),
            Some(DatabaseType::SQLite) => Box::new(SQLiteDialect {}),
            None => Box::new(GenericDialect {}),
        }
    }

    /// Accept or reject `sql`, logging the reason for a rejection
    #[must_use]
    pub fn validate(&self, sql: &str, map: &SchemaMap) -> bool {
        match self.check(sql, map) {
            Ok(Verdict::ParseFailureAccepted(reason)) => {
                tracing::warn!(%reason, "SQL not parseable, accepted without schema check");
                true
            }
            Ok(_) => true,
            Err(violation) => {
                tracing::warn!(%violation, "validation failed");
                false
            }
        }
    }

    /// Typed outcome of validating `sql` against `map`
    pub fn check(&self, sql: &str, map: &SchemaMap) -> Result<Verdict, Violation> {
        if statement::is_fast_pass(sql) {
            return Ok(Verdict::FastPass);
        }

        let statements = match Parser::parse_sql(self.dialect().as_ref(), sql) {
            Ok(statements) => statements,
            Err(e) => {
                let reason = e.to_string();
                return match self.policy {
                    ParseFailurePolicy::Lenient => Ok(Verdict::ParseFailureAccepted(reason)),
                    ParseFailurePolicy::Strict => Err(Violation::ParseFailed(reason)),
                };
            }
        };

        for stmt in &statements {
            let rendered = stmt.to_string();
            if statement::is_fast_pass(&rendered) || statement::is_session_setting(&rendered) {
                continue;
            }
            check_references(&References::collect(stmt), map)?;
        }

        Ok(Verdict::Valid)
    }
}

/// Validate with the generic dialect and lenient parse failures
#[must_use]
pub fn validate_sql(sql: &str, map: &SchemaMap) -> bool {
    SchemaValidator::new().validate(sql, map)
}

fn check_references(refs: &References, map: &SchemaMap) -> Result<(), Violation> {
    let mut known = Vec::with_capacity(refs.tables.len());
    for table in &refs.tables {
        match map.resolve(&table.value, table.quoted) {
            Some((_, schema)) => known.push(schema),
            None => return Err(Violation::UnknownTable { table: table.value.clone() }),
        }
    }

    for column in &refs.columns {
        let name = &column.column;

        if let Some(qualifier) = &column.qualifier {
            let target = refs.resolve_qualifier(qualifier);
            if let Some((table, schema)) = map.resolve(&target.value, target.quoted) {
                if !schema.has_column(&name.value, name.quoted) {
                    return Err(Violation::UnknownColumn {
                        column: name.value.clone(),
                        table: Some(table.to_string()),
                    });
                }
            }
            continue;
        }

        let resolved = refs.is_select_alias(name)
            || known.iter().any(|schema| schema.has_column(&name.value, name.quoted));
        if !resolved {
            return Err(Violation::UnknownColumn { column: name.value.clone(), table: None });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn shop() -> SchemaMap {
        [
            ("users", vec!["id".to_string(), "name".to_string(), "age".to_string()]),
            ("orders", vec!["id".to_string(), "user_id".to_string(), "total".to_string()]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_fast_pass_ignores_schema() {
        let validator = SchemaValidator::new();
        assert_eq!(validator.check("SHOW TABLES", &SchemaMap::new()), Ok(Verdict::FastPass));
        assert_eq!(
            validator.check("  drop table nowhere", &SchemaMap::new()),
            Ok(Verdict::FastPass)
        );
    }

    #[test]
    fn test_session_settings_skip_references() {
        let map: SchemaMap = [("users", vec!["id".to_string()])].into_iter().collect();
        let validator = SchemaValidator::for_engine(DatabaseType::Postgres);
        assert_eq!(validator.check("SET search_path TO analytics", &map), Ok(Verdict::Valid));
        assert_eq!(
            validator.check("SET search_path TO analytics; SELECT nope FROM users", &map),
            Err(Violation::UnknownColumn { column: "nope".to_string(), table: None })
        );
    }

    #[test]
    fn test_unknown_table() {
        let map: SchemaMap = [("users", vec!["id".to_string()])].into_iter().collect();
        let result = SchemaValidator::new().check("SELECT * FROM orders", &map);
        assert_eq!(result, Err(Violation::UnknownTable { table: "orders".to_string() }));
        assert_eq!(result.unwrap_err().to_string(), "Table 'orders' does not exist.");
    }

    #[test]
    fn test_qualified_unknown_column() {
        let map: SchemaMap = [("users", vec!["id".to_string(), "name".to_string()])]
            .into_iter()
            .collect();
        let result = SchemaValidator::new().check("SELECT users.email FROM users", &map);
        let violation = result.unwrap_err();
        assert_eq!(
            violation,
            Violation::UnknownColumn {
                column: "email".to_string(),
                table: Some("users".to_string()),
            }
        );
        assert_eq!(violation.to_string(), "Column 'email' not found in table 'users'.");
        assert!(validate_sql("SELECT users.name FROM users", &map));
    }

    #[test]
    fn test_unqualified_unknown_column() {
        let violation = SchemaValidator::new()
            .check("SELECT email FROM users", &shop())
            .unwrap_err();
        assert_eq!(violation.to_string(), "Column 'email' not found in the queried tables.");
    }

    #[test]
    fn test_join_through_aliases() {
        let sql = "SELECT u.name, SUM(o.total) AS spent FROM users u \
                   JOIN orders o ON o.user_id = u.id GROUP BY u.name ORDER BY spent DESC";
        assert_eq!(SchemaValidator::new().check(sql, &shop()), Ok(Verdict::Valid));

        let bad = "SELECT u.name FROM users u JOIN orders o ON o.customer_id = u.id";
        assert_eq!(
            SchemaValidator::new().check(bad, &shop()),
            Err(Violation::UnknownColumn {
                column: "customer_id".to_string(),
                table: Some("orders".to_string())
            })
        );
    }

    #[test]
    fn test_unknown_qualifier_not_flagged() {
        let sql = "SELECT x.anything FROM users";
        assert_eq!(SchemaValidator::new().check(sql, &shop()), Ok(Verdict::Valid));
    }

    #[test]
    fn test_select_alias_in_order_by() {
        let sql = "SELECT name, COUNT(*) AS n FROM users GROUP BY name ORDER BY n";
        assert!(SchemaValidator::new().validate(sql, &shop()));
    }

    #[test]
    fn test_parse_failure_policies() {
        let garbage = "SELECT FROM WHERE ,,";
        let lenient = SchemaValidator::new().check(garbage, &shop());
        assert!(matches!(lenient, Ok(Verdict::ParseFailureAccepted(_))));

        let strict = SchemaValidator::new()
            .with_policy(ParseFailurePolicy::Strict)
            .check(garbage, &shop());
        assert!(matches!(strict, Err(Violation::ParseFailed(_))));
        assert!(strict.unwrap_err().to_string().starts_with("Could not parse SQL structure."));
    }

    #[test]
    fn test_engine_dialect() {
        let validator = SchemaValidator::for_engine(DatabaseType::MySQL);
        assert!(validator.validate("SELECT `name` FROM `users` LIMIT 5", &shop()));

        let validator = SchemaValidator::for_engine(DatabaseType::Postgres);
        assert!(validator.validate("SELECT name FROM users WHERE age > 30", &shop()));
    }

    #[test]
    fn test_batch_checks_every_statement() {
        let sql = "SELECT id FROM users; SELECT id FROM invoices;";
        assert_eq!(
            SchemaValidator::new().check(sql, &shop()),
            Err(Violation::UnknownTable { table: "invoices".to_string() })
        );
    }

    #[test]
    fn test_policy_from_config_string() {
        let policy: ParseFailurePolicy = serde_json::from_str("\"strict\"").unwrap();
        assert_eq!(policy, ParseFailurePolicy::Strict);
        assert_eq!(ParseFailurePolicy::default(), ParseFailurePolicy::Lenient);
    }
}
