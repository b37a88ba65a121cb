//! MindSQL - Schema-Grounded SQL from Model Replies
//!
//! MindSQL sits between a language model and a database. It pulls SQL out of free-form
//! model replies, checks every referenced table and column against a live schema map
//! before anything is executed, and keeps that map in sync with the database.
//!
//! # Core Principles
//! - Nothing unvalidated reaches the database (except administrative/DDL fast-pass)
//! - The schema map is derived state: rebuilt wholesale, never patched
//! - Validation outcomes are values; I/O failures are errors
//! - JSON-only output from the CLI, diagnostics on stderr
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`output`] - JSON output envelope types
//! - [`statement`] - Leading-keyword statement classification
//! - [`engine`] - Database engine trait and implementations
//! - [`schema`] - Schema map, shared store and synchronizer
//! - [`extract`] - SQL extraction from model replies
//! - [`validate`] - Schema and plot-shape validation
//! - [`pipeline`] - Per-attempt composition and retry feedback
//! - [`config`] - Configuration management

pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod schema;
pub mod statement;
pub mod validate;

pub use config::{
    list_connections, resolve_connection, save_connection, ConfigLocation, MindsqlConfig,
    StoredConnection,
};
pub use engine::{
    ColumnInfo, ConnectionConfig, ConnectionInfo, DatabaseEngine, DatabaseType, ExecuteOptions,
    ForeignKeyInfo, QueryResult, SchemaInfo, TableInfo,
};
pub use error::{MindsqlError, Result};
pub use extract::{classify_reply, extract_sql, ModelReply};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use pipeline::{answer_from_schema, prepare, Intent, Prepared, Rejection};
pub use schema::{ForeignKey, SchemaMap, SchemaStore, SchemaSynchronizer, TableSchema};
pub use validate::{
    validate_plot, validate_sql, ParseFailurePolicy, SchemaValidator, Verdict, Violation,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_exports() {
        let map: SchemaMap = [("users", vec!["id".to_string()])].into_iter().collect();
        let sql = extract_sql("```sql\nSELECT id FROM users\n```").unwrap();

        assert!(validate_sql(&sql, &map));
        assert_eq!(DatabaseType::SQLite.as_str(), "sqlite");
    }
}
