//! Edge Case Tests
//!
//! Model replies and SQL shapes that sit on the boundaries of the extractor and the
//! validator: odd fences, sentinel look-alikes, quoting, CTEs, subqueries, mixed
//! batches and parse failures.

use mindsql::extract::{classify_reply, extract_sql, ModelReply};
use mindsql::validate::{validate_plot, ParseFailurePolicy, SchemaValidator, Verdict, Violation};
use mindsql::{DatabaseType, SchemaMap};
use pretty_assertions::assert_eq;

fn shop() -> SchemaMap {
    serde_json::from_str(
        r#"{
            "users": ["id", "name", "age"],
            "orders": {
                "columns": ["id", "user_id", "total", "created_at"],
                "primary_key": ["id"],
                "foreign_keys": [
                    {
                        "child_columns": ["user_id"],
                        "parent_table": "users",
                        "parent_columns": ["id"]
                    }
                ]
            },
            "OrderItems": ["order_id", "Sku"]
        }"#,
    )
    .expect("valid schema map")
}

fn check(sql: &str) -> Result<Verdict, Violation> {
    SchemaValidator::new().check(sql, &shop())
}

// ============================================================================
// Extraction
// ============================================================================

#[test]
fn test_mysql_info_string_not_part_of_sql() {
    let reply = "```mysql\nSELECT id FROM users\n```";
    assert_eq!(extract_sql(reply).as_deref(), Some("SELECT id FROM users"));
}

#[test]
fn test_fence_opening_with_keyword_keeps_it() {
    let reply = "```SELECT id\nFROM users```";
    assert_eq!(extract_sql(reply).as_deref(), Some("SELECT id\nFROM users"));
}

#[test]
fn test_first_untagged_fence_wins() {
    let reply = "```\nSELECT 1\n```\n```\nSELECT 2\n```";
    assert_eq!(extract_sql(reply).as_deref(), Some("SELECT 1"));
}

#[test]
fn test_settings_is_not_set() {
    assert_eq!(extract_sql("SETTINGS are per user; SET x = 1"), Some("SET x = 1;".to_string()));
}

#[test]
fn test_extracted_session_setting_validates() {
    let sql = extract_sql("SET search_path TO analytics").expect("SET is recognized as SQL");
    assert_eq!(sql, "SET search_path TO analytics;");
    assert_eq!(check(&sql), Ok(Verdict::Valid));
}

#[test]
fn test_only_allow_listed_segments_survive() {
    let reply = "Note: careful; DELETE FROM orders WHERE id = 4; Done";
    assert_eq!(extract_sql(reply).as_deref(), Some("DELETE FROM orders WHERE id = 4;"));
}

#[test]
fn test_lowercase_keywords_accepted() {
    assert_eq!(
        extract_sql("select name from users").as_deref(),
        Some("select name from users;")
    );
}

#[test]
fn test_sentinel_must_lead() {
    let reply = "Sure. CLARIFICATION_NEEDED: which year?";
    assert!(matches!(classify_reply(reply), ModelReply::Text(_)));
}

#[test]
fn test_empty_clarification() {
    assert_eq!(classify_reply("CLARIFICATION_NEEDED:"), ModelReply::Clarification(""));
}

// ============================================================================
// Table references
// ============================================================================

#[test]
fn test_cte_name_is_not_a_table() {
    let sql = "WITH big AS (SELECT user_id, total FROM orders WHERE total > 10) \
               SELECT user_id FROM big";
    assert_eq!(check(sql), Ok(Verdict::Valid));
}

#[test]
fn test_cte_column_list_names_resolve() {
    let sql = "WITH x(a) AS (SELECT id FROM users) SELECT a FROM x";
    assert_eq!(check(sql), Ok(Verdict::Valid));
    assert_eq!(
        check("WITH x(a) AS (SELECT id FROM users) SELECT b FROM x"),
        Err(Violation::UnknownColumn { column: "b".to_string(), table: None })
    );
}

#[test]
fn test_subquery_tables_checked() {
    let sql = "SELECT name FROM users WHERE id IN (SELECT user_id FROM refunds)";
    assert_eq!(check(sql), Err(Violation::UnknownTable { table: "refunds".to_string() }));
}

#[test]
fn test_first_unknown_table_reported() {
    let sql = "SELECT * FROM ghosts g JOIN phantoms p ON g.id = p.id";
    assert_eq!(check(sql), Err(Violation::UnknownTable { table: "ghosts".to_string() }));
}

#[test]
fn test_unquoted_table_matches_case_insensitively() {
    assert_eq!(check("SELECT Sku FROM orderitems"), Ok(Verdict::Valid));
    assert_eq!(check("SELECT ID FROM USERS"), Ok(Verdict::Valid));
}

#[test]
fn test_quoted_table_must_match_exactly() {
    assert_eq!(check(r#"SELECT "Sku" FROM "OrderItems""#), Ok(Verdict::Valid));
    assert_eq!(
        check(r#"SELECT order_id FROM "orderitems""#),
        Err(Violation::UnknownTable { table: "orderitems".to_string() })
    );
}

#[test]
fn test_quoted_column_must_match_exactly() {
    assert_eq!(
        check(r#"SELECT "sku" FROM "OrderItems""#),
        Err(Violation::UnknownColumn { column: "sku".to_string(), table: None })
    );
}

// ============================================================================
// Column references
// ============================================================================

#[test]
fn test_wildcards_and_functions_skipped() {
    assert_eq!(check("SELECT *, COUNT(*) FROM users"), Ok(Verdict::Valid));
    assert_eq!(check("SELECT u.* FROM users u"), Ok(Verdict::Valid));
}

#[test]
fn test_function_argument_columns_checked() {
    assert_eq!(
        check("SELECT MAX(salary) FROM users"),
        Err(Violation::UnknownColumn { column: "salary".to_string(), table: None })
    );
}

#[test]
fn test_alias_shadowing_table_name() {
    let sql = "SELECT users.total FROM orders AS users";
    assert_eq!(check(sql), Ok(Verdict::Valid));
}

#[test]
fn test_column_of_other_joined_table_accepted_unqualified() {
    let sql = "SELECT name, total FROM users JOIN orders ON orders.user_id = users.id";
    assert_eq!(check(sql), Ok(Verdict::Valid));
}

#[test]
fn test_column_of_unreferenced_table_rejected() {
    assert_eq!(
        check("SELECT total FROM users"),
        Err(Violation::UnknownColumn { column: "total".to_string(), table: None })
    );
}

#[test]
fn test_select_alias_in_having() {
    let sql = "SELECT user_id, SUM(total) AS spent FROM orders GROUP BY user_id HAVING spent > 100";
    assert_eq!(check(sql), Ok(Verdict::Valid));
}

#[test]
fn test_string_literals_are_not_columns() {
    assert_eq!(check("SELECT id FROM users WHERE name = 'nobody'"), Ok(Verdict::Valid));
}

// ============================================================================
// DML
// ============================================================================

#[test]
fn test_insert_unknown_column() {
    assert_eq!(
        check("INSERT INTO users (id, nickname) VALUES (1, 'x')"),
        Err(Violation::UnknownColumn {
            column: "nickname".to_string(),
            table: Some("users".to_string())
        })
    );
    assert_eq!(check("INSERT INTO users (id, name) VALUES (3, 'Cy')"), Ok(Verdict::Valid));
}

#[test]
fn test_update_and_delete() {
    assert_eq!(check("UPDATE users SET age = age + 1 WHERE id = 2"), Ok(Verdict::Valid));
    assert_eq!(
        check("UPDATE users SET email = 'x' WHERE id = 2"),
        Err(Violation::UnknownColumn { column: "email".to_string(), table: None })
    );
    assert_eq!(check("DELETE FROM orders WHERE total < 1"), Ok(Verdict::Valid));
}

// ============================================================================
// Batches, fast-pass and parse failures
// ============================================================================

#[test]
fn test_fast_pass_is_leading_keyword_of_whole_batch() {
    let sql = "CREATE TABLE x (id INT); SELECT nope FROM nowhere;";
    assert_eq!(check(sql), Ok(Verdict::FastPass));
}

#[test]
fn test_ddl_inside_batch_skipped() {
    let sql = "SELECT id FROM users; DROP TABLE scratch;";
    assert_eq!(check(sql), Ok(Verdict::Valid));
}

#[test]
fn test_leading_comment_does_not_hide_fast_pass() {
    assert_eq!(check("-- cleanup\nDROP TABLE scratch"), Ok(Verdict::FastPass));
}

#[test]
fn test_empty_input_is_valid() {
    assert_eq!(check(""), Ok(Verdict::Valid));
}

#[test]
fn test_parse_failure_lenient_and_strict() {
    let sql = "SELEC name FROM users";
    assert!(matches!(check(sql), Ok(Verdict::ParseFailureAccepted(_))));

    let strict = SchemaValidator::new().with_policy(ParseFailurePolicy::Strict);
    assert!(matches!(strict.check(sql, &shop()), Err(Violation::ParseFailed(_))));
    assert!(!strict.validate(sql, &shop()));
}

#[test]
fn test_dialect_specific_syntax() {
    let pg = SchemaValidator::for_engine(DatabaseType::Postgres);
    assert!(pg.validate("SELECT created_at::date FROM orders", &shop()));

    let sqlite = SchemaValidator::for_engine(DatabaseType::SQLite);
    assert!(sqlite.validate("SELECT name FROM users LIMIT 3 OFFSET 1", &shop()));
}

// ============================================================================
// Plot shape
// ============================================================================

#[test]
fn test_plot_shape_edges() {
    assert!(validate_plot("SELECT name AS LABEL, AVG(age) AS VALUE FROM users GROUP BY name"));
    assert!(!validate_plot("SELECT COUNT(*) FROM users"));
    assert!(!validate_plot(""));
}
