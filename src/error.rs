//! Error Handling Infrastructure
//!
//! This module defines the error type for every fallible I/O path in MindSQL.
//! All errors are structured and map to stable error codes for JSON output.
//!
//! Validation outcomes (unknown table, unknown column, unparseable SQL) are *not*
//! errors; they are values of [`crate::validate::Violation`] that the caller acts on.
//!
//! # Error Categories
//! - `ConnectionFailed`: Database connection errors
//! - `QueryFailed`: Query execution errors
//! - `InvalidInput`: Malformed input or missing required parameters
//! - `EngineError`: Engine-specific database errors (mostly introspection)
//! - `ConfigError`: Configuration file or connection registry errors
//! - `SchemaSync`: Schema description could not be persisted

use thiserror::Error;

/// Main error type for MindSQL operations
#[derive(Error, Debug)]
pub enum MindsqlError {
    /// Database connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Engine-specific database error
    #[error("Engine error ({engine}): {detail}")]
    EngineError { engine: String, detail: String },

    /// Configuration error (file not found, invalid JSON, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Schema synchronization failed after introspection succeeded
    #[error("Schema sync failed: {0}")]
    SchemaSync(String),
}

impl MindsqlError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::QueryFailed(_) => "QUERY_FAILED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::EngineError { .. } => "ENGINE_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::SchemaSync(_) => "SCHEMA_SYNC_FAILED",
        }
    }

    /// One-line, user-facing message (no credentials, no backtrace)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a query failed error
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an engine-specific error
    pub fn engine_error(engine: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::EngineError { engine: engine.into(), detail: detail.into() }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a schema sync error
    pub fn schema_sync(message: impl Into<String>) -> Self {
        Self::SchemaSync(message.into())
    }
}

/// Result type alias for MindSQL operations
pub type Result<T> = std::result::Result<T, MindsqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(MindsqlError::connection_failed("test").error_code(), "CONNECTION_FAILED");
        assert_eq!(MindsqlError::query_failed("test").error_code(), "QUERY_FAILED");
        assert_eq!(MindsqlError::invalid_input("test").error_code(), "INVALID_INPUT");
        assert_eq!(MindsqlError::engine_error("mysql", "test").error_code(), "ENGINE_ERROR");
        assert_eq!(MindsqlError::config_error("test").error_code(), "CONFIG_ERROR");
        assert_eq!(MindsqlError::schema_sync("test").error_code(), "SCHEMA_SYNC_FAILED");
    }

    #[test]
    fn test_error_messages_are_single_line() {
        let err = MindsqlError::engine_error("postgres", "relation \"users\" does not exist");
        assert!(err.message().contains("postgres"));
        assert!(err.message().contains("users"));
        assert!(!err.message().contains('\n'));

        let err = MindsqlError::schema_sync("could not write schema.txt");
        assert_eq!(err.message(), "Schema sync failed: could not write schema.txt");
    }
}
