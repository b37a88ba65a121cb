//! Schema Synchronization
//!
//! Introspects a live connection, renders the human-readable schema description used
//! as model prompt context, persists it, and swaps a freshly built [`SchemaMap`] into
//! the shared [`SchemaStore`].
//!
//! # Ordering
//! The description file is written first (temp file + rename) and the map is
//! replaced only after the write succeeded. On any failure the store keeps its
//! last-known-good map.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{SchemaMap, SchemaStore};
use crate::engine::{introspect_any, ConnectionConfig, DatabaseEngine, SchemaInfo};
use crate::error::{MindsqlError, Result};

/// Default location of the persisted schema description
pub const DEFAULT_SCHEMA_FILE: &str = ".mindsql/schema.txt";

/// Rebuilds the schema map and description file from live introspection
#[derive(Debug, Clone)]
pub struct SchemaSynchronizer {
    store: Arc<SchemaStore>,
    schema_file: PathBuf,
}

impl SchemaSynchronizer {
    pub fn new(store: Arc<SchemaStore>, schema_file: impl Into<PathBuf>) -> Self {
        Self { store, schema_file: schema_file.into() }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SchemaStore> {
        &self.store
    }

    #[must_use]
    pub fn schema_file(&self) -> &Path {
        &self.schema_file
    }

    /// Introspect through engine `E` and refresh; returns the description text
    pub async fn refresh<E: DatabaseEngine>(&self, config: &ConnectionConfig) -> Result<String> {
        let info = E::introspect(config).await?;
        self.refresh_from(&info)
    }

    /// Same as [`refresh`](Self::refresh), dispatching on `config.engine`
    pub async fn refresh_any(&self, config: &ConnectionConfig) -> Result<String> {
        let info = introspect_any(config).await?;
        self.refresh_from(&info)
    }

    /// Refresh from an already-introspected snapshot
    pub fn refresh_from(&self, info: &SchemaInfo) -> Result<String> {
        let description = render_description(info);
        write_atomically(&self.schema_file, &description)?;

        let map = SchemaMap::from(info);
        tracing::info!(
            tables = map.len(),
            file = %self.schema_file.display(),
            "schema map refreshed"
        );
        self.store.replace(map);

        Ok(description)
    }
}

/// Render the prompt-context description of `info`
///
/// One `CREATE TABLE` block per table in listed order, followed by key comments and
/// a blank line.
#[must_use]
pub fn render_description(info: &SchemaInfo) -> String {
    let mut out = String::new();

    for table in &info.tables {
        let _ = writeln!(out, "CREATE TABLE {} (", table.name);
        let last = table.columns.len().saturating_sub(1);
        for (i, column) in table.columns.iter().enumerate() {
            let comma = if i < last { "," } else { "" };
            let _ = writeln!(out, "    {} {}{comma}", column.name, column.data_type);
        }
        out.push_str(");\n");

        if !table.primary_key.is_empty() {
            let _ = writeln!(out, "-- Primary Keys: {}", table.primary_key.join(", "));
        }

        if !table.foreign_keys.is_empty() {
            let edges: Vec<String> = table
                .foreign_keys
                .iter()
                .map(|fk| {
                    format!(
                        "({}) references {}({})",
                        fk.columns.join(", "),
                        fk.referenced_table,
                        fk.referenced_columns.join(", ")
                    )
                })
                .collect();
            let _ = writeln!(out, "-- Foreign Keys: {}", edges.join(", "));
        }

        out.push('\n');
    }

    out
}

fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            MindsqlError::schema_sync(format!("Could not create {}: {e}", parent.display()))
        })?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).map_err(|e| {
        MindsqlError::schema_sync(format!("Could not write {}: {e}", tmp.display()))
    })?;

    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        MindsqlError::schema_sync(format!("Could not replace {}: {e}", path.display()))
    })
}
