//! JSON Output Envelope Types
//!
//! Every `mindsql` subcommand prints exactly one envelope on stdout.
//!
//! # Output Contract
//! - Success: `{"ok": true, "engine": "...", "command": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "engine": "...", "command": "...", "error": {...}}`
//!   where `error` is `{"code": "...", "message": "..."}`

use serde::{Deserialize, Serialize};

use crate::error::MindsqlError;

/// Success envelope for operation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Database engine used (empty for engine-independent commands like `extract`)
    pub engine: String,

    /// Command that was executed
    pub command: String,

    /// Operation-specific data
    pub data: T,

    /// Execution metadata
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(
        engine: impl Into<String>,
        command: impl Into<String>,
        data: T,
        meta: Metadata,
    ) -> Self {
        Self {
            ok: true,
            engine: engine.into(),
            command: command.into(),
            data,
            meta,
        }
    }
}

/// Error envelope for operation failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    pub engine: String,

    pub command: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(engine: impl Into<String>, command: impl Into<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            engine: engine.into(),
            command: command.into(),
            error,
        }
    }

    /// Create error envelope from `MindsqlError`
    pub fn from_error(
        engine: impl Into<String>,
        command: impl Into<String>,
        err: &MindsqlError,
    ) -> Self {
        Self::new(engine, command, ErrorInfo::from(err))
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "SCHEMA_VIOLATION", "CONNECTION_FAILED")
    pub code: String,

    /// One-line human-readable cause
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&MindsqlError> for ErrorInfo {
    fn from(err: &MindsqlError) -> Self {
        Self::new(err.error_code(), err.message())
    }
}

impl From<MindsqlError> for ErrorInfo {
    fn from(err: MindsqlError) -> Self {
        Self::from(&err)
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Execution time in milliseconds
    pub execution_ms: u64,

    /// Number of rows returned (query results only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_returned: Option<usize>,

    /// Whether the schema map was refreshed as part of this command
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub schema_refreshed: bool,
}

impl Metadata {
    pub fn new(execution_ms: u64) -> Self {
        Self {
            execution_ms,
            rows_returned: None,
            schema_refreshed: false,
        }
    }

    pub fn with_rows(execution_ms: u64, rows_returned: usize) -> Self {
        Self { rows_returned: Some(rows_returned), ..Self::new(execution_ms) }
    }

    #[must_use]
    pub fn refreshed(mut self, refreshed: bool) -> Self {
        self.schema_refreshed = refreshed;
        self
    }
}
