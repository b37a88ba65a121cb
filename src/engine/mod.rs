//! Database Engine Traits and Core Types
//!
//! This module defines the collaborator interface the schema synchronizer and the
//! CLI rely on: connection validation, schema introspection and pass-through SQL
//! execution. Each engine (`PostgreSQL`, `MySQL`, `SQLite`) implements
//! [`DatabaseEngine`].
//!
//! # Stateless Design
//! All trait methods are stateless and take `&ConnectionConfig` as input.
//! Connections are opened, used, and closed within each method call.
//!
//! # Engine Isolation
//! Each engine implementation is completely independent.
//! The only shared helpers are the statement classifiers in [`crate::statement`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{MindsqlError, Result};

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

/// Supported database engine types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `PostgreSQL` database
    Postgres,
    /// `MySQL` database (includes `MariaDB`)
    MySQL,
    /// `SQLite` database
    SQLite,
}

impl DatabaseType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DatabaseType {
    type Err = MindsqlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySQL),
            "sqlite" | "sqlite3" => Ok(Self::SQLite),
            other => Err(MindsqlError::invalid_input(format!("Unknown engine '{other}'"))),
        }
    }
}

/// Connection configuration for database engines
///
/// Fields are engine-specific (e.g., `file` only applies to `SQLite`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub engine: DatabaseType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database name (for postgres/mysql)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Database file path (for sqlite)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl ConnectionConfig {
    #[must_use]
    pub const fn postgres(
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
    ) -> Self {
        Self {
            engine: DatabaseType::Postgres,
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            database: Some(database),
            file: None,
        }
    }

    #[must_use]
    pub const fn mysql(
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
    ) -> Self {
        Self {
            engine: DatabaseType::MySQL,
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            database: Some(database),
            file: None,
        }
    }

    #[must_use]
    pub const fn sqlite(file: PathBuf) -> Self {
        Self {
            engine: DatabaseType::SQLite,
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            file: Some(file),
        }
    }

    /// Same server and credentials, different database.
    ///
    /// For `SQLite` the database *is* the file, so the name replaces the file path.
    #[must_use]
    pub fn with_database(&self, name: &str) -> Self {
        let mut switched = self.clone();
        match self.engine {
            DatabaseType::SQLite => switched.file = Some(PathBuf::from(name)),
            DatabaseType::Postgres | DatabaseType::MySQL => {
                switched.database = Some(name.to_string());
            }
        }
        switched
    }

    /// Credential-free description of the target, safe for logs and banners
    #[must_use]
    pub fn target(&self) -> String {
        match self.engine {
            DatabaseType::SQLite => self.file.as_ref().map_or_else(
                || "sqlite:<unset>".to_string(),
                |f| format!("sqlite:{}", f.display()),
            ),
            DatabaseType::Postgres | DatabaseType::MySQL => format!(
                "{}://{}:{}/{}",
                self.engine,
                self.host.as_deref().unwrap_or("<unset>"),
                self.port.map_or_else(|| "<unset>".to_string(), |p| p.to_string()),
                self.database.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Connection information returned after successful connection validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub database_version: String,

    pub server_info: String,

    pub connected_database: String,

    pub user: String,
}

/// Limits applied by an engine while executing a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Maximum number of rows to return; None means no limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,

    /// Query timeout in milliseconds; None means no timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Schema introspection result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    /// Tables in the order the database lists them
    pub tables: Vec<TableInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,

    /// Columns in database-reported (ordinal) order
    pub columns: Vec<ColumnInfo>,

    /// Primary key columns in key order; empty when the table has none
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,

    /// Column data type as the engine spells it
    pub data_type: String,

    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    /// Constraint name (synthesized for engines without named constraints)
    pub name: String,

    /// Column names in this table
    pub columns: Vec<String>,

    pub referenced_table: String,

    pub referenced_columns: Vec<String>,
}

/// Result of executing a (possibly multi-statement) batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names of the last row-returning statement
    pub columns: Vec<String>,

    /// Rows of the last row-returning statement, one JSON value per column
    pub rows: Vec<Vec<serde_json::Value>>,

    /// Total rows affected by non-row-returning statements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,

    /// Number of statements sent to the database
    pub statements_executed: usize,
}

impl QueryResult {
    /// Whether any statement of the batch produced a result set
    #[must_use]
    pub fn returned_rows(&self) -> bool {
        !self.columns.is_empty()
    }

    pub(crate) fn add_affected(&mut self, affected: u64) {
        self.rows_affected = Some(self.rows_affected.unwrap_or(0) + affected);
    }
}

/// Database engine trait
///
/// Each method is stateless and takes a connection config as input.
pub trait DatabaseEngine {
    /// Open a connection, read server metadata, close it.
    fn validate_connection(
        config: &ConnectionConfig,
    ) -> impl std::future::Future<Output = Result<ConnectionInfo>> + Send;

    /// Introspect every base table of the connected database.
    ///
    /// Tables come back in the order the database lists them; columns in ordinal order.
    fn introspect(
        config: &ConnectionConfig,
    ) -> impl std::future::Future<Output = Result<SchemaInfo>> + Send;

    /// Execute a `;`-separated batch inside a single transaction.
    ///
    /// Bare transaction control statements are skipped. Any failure rolls the
    /// whole batch back and is reported as `QueryFailed`.
    fn execute(
        config: &ConnectionConfig,
        sql: &str,
        options: &ExecuteOptions,
    ) -> impl std::future::Future<Output = Result<QueryResult>> + Send;
}

fn engine_disabled(engine: DatabaseType) -> MindsqlError {
    MindsqlError::invalid_input(format!("Engine '{engine}' is not enabled in this build"))
}

/// Validate a connection with whichever engine `config` names
pub async fn validate_any(config: &ConnectionConfig) -> Result<ConnectionInfo> {
    match config.engine {
        #[cfg(feature = "sqlite")]
        DatabaseType::SQLite => sqlite::SqliteEngine::validate_connection(config).await,
        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => postgres::PostgresEngine::validate_connection(config).await,
        #[cfg(feature = "mysql")]
        DatabaseType::MySQL => mysql::MySqlEngine::validate_connection(config).await,
        #[allow(unreachable_patterns)]
        other => Err(engine_disabled(other)),
    }
}

/// Introspect with whichever engine `config` names
pub async fn introspect_any(config: &ConnectionConfig) -> Result<SchemaInfo> {
    match config.engine {
        #[cfg(feature = "sqlite")]
        DatabaseType::SQLite => sqlite::SqliteEngine::introspect(config).await,
        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => postgres::PostgresEngine::introspect(config).await,
        #[cfg(feature = "mysql")]
        DatabaseType::MySQL => mysql::MySqlEngine::introspect(config).await,
        #[allow(unreachable_patterns)]
        other => Err(engine_disabled(other)),
    }
}

/// Execute with whichever engine `config` names
pub async fn execute_any(
    config: &ConnectionConfig,
    sql: &str,
    options: &ExecuteOptions,
) -> Result<QueryResult> {
    match config.engine {
        #[cfg(feature = "sqlite")]
        DatabaseType::SQLite => sqlite::SqliteEngine::execute(config, sql, options).await,
        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => postgres::PostgresEngine::execute(config, sql, options).await,
        #[cfg(feature = "mysql")]
        DatabaseType::MySQL => mysql::MySqlEngine::execute(config, sql, options).await,
        #[allow(unreachable_patterns)]
        other => Err(engine_disabled(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_serialization() {
        assert_eq!(serde_json::to_string(&DatabaseType::Postgres).unwrap(), r#""postgres""#);
        assert_eq!(serde_json::to_string(&DatabaseType::MySQL).unwrap(), r#""mysql""#);
        assert_eq!(serde_json::to_string(&DatabaseType::SQLite).unwrap(), r#""sqlite""#);
    }

    #[test]
    fn test_database_type_from_str() {
        assert_eq!("PostgreSQL".parse::<DatabaseType>().unwrap(), DatabaseType::Postgres);
        assert_eq!("mariadb".parse::<DatabaseType>().unwrap(), DatabaseType::MySQL);
        assert_eq!("sqlite3".parse::<DatabaseType>().unwrap(), DatabaseType::SQLite);
        assert!("oracle".parse::<DatabaseType>().is_err());
    }

    #[test]
    fn test_with_database_switches_target_only() {
        let base = ConnectionConfig::mysql(
            "localhost".to_string(),
            3306,
            "trial".to_string(),
            "1234".to_string(),
            "shop".to_string(),
        );
        let switched = base.with_database("inventory");
        assert_eq!(switched.database.as_deref(), Some("inventory"));
        assert_eq!(switched.host, base.host);
        assert_eq!(switched.password, base.password);

        let file = ConnectionConfig::sqlite(PathBuf::from("a.db")).with_database("b.db");
        assert_eq!(file.file, Some(PathBuf::from("b.db")));
    }

    #[test]
    fn test_target_hides_credentials() {
        let config = ConnectionConfig::postgres(
            "db.internal".to_string(),
            5432,
            "app".to_string(),
            "hunter2".to_string(),
            "sales".to_string(),
        );
        let target = config.target();
        assert_eq!(target, "postgres://db.internal:5432/sales");
        assert!(!target.contains("hunter2"));
    }

    #[test]
    fn test_query_result_affected_accumulates() {
        let mut result = QueryResult::default();
        assert!(!result.returned_rows());
        result.add_affected(2);
        result.add_affected(3);
        assert_eq!(result.rows_affected, Some(5));
    }
}
