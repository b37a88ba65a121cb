//! `SQLite` Database Engine Implementation
//!
//! # Features
//! - File-based connections (`/path/to/db.sqlite`)
//! - In-memory connections (`:memory:`)
//! - Schema introspection via the `pragma_*` table-valued functions
//! - Multi-statement execution inside one transaction
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver, no async needed)
//! - BLOB data is Base64-encoded for JSON safety
//! - Timeouts enforced via `busy_timeout`
//! - Row limits enforced in application code

use rusqlite::{Connection, OpenFlags, Row};
use std::collections::BTreeMap;

use crate::engine::{
    ColumnInfo, ConnectionConfig, ConnectionInfo, DatabaseEngine, DatabaseType, ExecuteOptions,
    ForeignKeyInfo, QueryResult, SchemaInfo, TableInfo,
};
use crate::error::{MindsqlError, Result};
use crate::statement;

/// `SQLite` database engine implementation
pub struct SqliteEngine;

impl DatabaseEngine for SqliteEngine {
    async fn validate_connection(config: &ConnectionConfig) -> Result<ConnectionInfo> {
        let path = sqlite_path(config)?;
        let conn = open_connection(path, true)?;

        let version: String =
            conn.query_row("SELECT sqlite_version()", [], |row| row.get(0)).map_err(|e| {
                MindsqlError::connection_failed(format!("Failed to query SQLite version: {e}"))
            })?;

        let db_name = std::path::Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path)
            .to_string();

        Ok(ConnectionInfo {
            database_version: version.clone(),
            server_info: format!("SQLite {version}"),
            connected_database: db_name,
            user: "N/A".to_string(),
        })
    }

    async fn introspect(config: &ConnectionConfig) -> Result<SchemaInfo> {
        let conn = open_connection(sqlite_path(config)?, true)?;

        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table'
                 AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )
            .map_err(|e| sqlite_error(format!("Failed to query tables: {e}")))?;

        let table_names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .and_then(Iterator::collect)
            .map_err(|e| sqlite_error(format!("Failed to fetch table names: {e}")))?;

        let mut tables = Vec::with_capacity(table_names.len());
        for table_name in table_names {
            tables.push(introspect_table(&conn, &table_name)?);
        }

        tracing::debug!(engine = "sqlite", tables = tables.len(), "introspection complete");
        Ok(SchemaInfo { tables })
    }

    async fn execute(
        config: &ConnectionConfig,
        sql: &str,
        options: &ExecuteOptions,
    ) -> Result<QueryResult> {
        let mut conn = open_connection(sqlite_path(config)?, false)?;

        if let Some(timeout_ms) = options.timeout_ms {
            conn.busy_timeout(std::time::Duration::from_millis(timeout_ms))
                .map_err(|e| sqlite_error(format!("Failed to set timeout: {e}")))?;
        }

        let tx = conn
            .transaction()
            .map_err(|e| MindsqlError::query_failed(format!("Failed to begin transaction: {e}")))?;

        // Dropping an uncommitted transaction rolls it back.
        let result = run_batch(&tx, sql, options)?;

        tx.commit()
            .map_err(|e| MindsqlError::query_failed(format!("Failed to commit: {e}")))?;

        Ok(result)
    }
}

fn sqlite_path(config: &ConnectionConfig) -> Result<&str> {
    if config.engine != DatabaseType::SQLite {
        return Err(MindsqlError::invalid_input(format!(
            "Expected SQLite engine, got {}",
            config.engine
        )));
    }

    let file_path = config
        .file
        .as_ref()
        .ok_or_else(|| MindsqlError::invalid_input("SQLite requires 'file' parameter"))?;

    file_path.to_str().ok_or_else(|| {
        MindsqlError::invalid_input("SQLite file path contains invalid UTF-8 characters")
    })
}

fn sqlite_error(detail: String) -> MindsqlError {
    MindsqlError::engine_error("sqlite", detail)
}

fn open_connection(path: &str, read_only: bool) -> Result<Connection> {
    let flags = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
    };

    Connection::open_with_flags(path, flags).map_err(|e| {
        MindsqlError::connection_failed(format!("Failed to open SQLite database: {e}"))
    })
}

fn introspect_table(conn: &Connection, table_name: &str) -> Result<TableInfo> {
    let mut stmt = conn
        .prepare(r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?1) ORDER BY cid"#)
        .map_err(|e| sqlite_error(format!("Failed to prepare table_info for {table_name}: {e}")))?;

    let rows: Vec<(ColumnInfo, i64)> = stmt
        .query_map([table_name], |row| {
            Ok((
                ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    nullable: row.get::<_, i64>(2)? == 0,
                },
                row.get::<_, i64>(3)?,
            ))
        })
        .and_then(Iterator::collect)
        .map_err(|e| sqlite_error(format!("Failed to query columns for {table_name}: {e}")))?;

    // pk holds the 1-based position inside the key, 0 for non-key columns
    let mut key_positions: Vec<(i64, String)> =
        rows.iter().filter(|(_, pk)| *pk > 0).map(|(c, pk)| (*pk, c.name.clone())).collect();
    key_positions.sort();
    let primary_key = key_positions.into_iter().map(|(_, name)| name).collect();

    let columns = rows.into_iter().map(|(column, _)| column).collect();
    let foreign_keys = introspect_foreign_keys(conn, table_name)?;

    Ok(TableInfo { name: table_name.to_string(), columns, primary_key, foreign_keys })
}

fn introspect_foreign_keys(conn: &Connection, table_name: &str) -> Result<Vec<ForeignKeyInfo>> {
    let mut stmt = conn
        .prepare(
            r#"SELECT id, "table", "from", "to" FROM pragma_foreign_key_list(?1) ORDER BY id, seq"#,
        )
        .map_err(|e| {
            sqlite_error(format!("Failed to prepare foreign_key_list for {table_name}: {e}"))
        })?;

    let rows: Vec<(i64, String, String, Option<String>)> = stmt
        .query_map([table_name], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
        .and_then(Iterator::collect)
        .map_err(|e| sqlite_error(format!("Failed to query foreign keys for {table_name}: {e}")))?;

    // Grouped by constraint id; BTreeMap keeps the output order stable across runs
    let mut grouped: BTreeMap<i64, (String, Vec<String>, Vec<Option<String>>)> = BTreeMap::new();
    for (id, parent, from, to) in rows {
        let entry = grouped.entry(id).or_insert_with(|| (parent, Vec::new(), Vec::new()));
        entry.1.push(from);
        entry.2.push(to);
    }

    let mut foreign_keys = Vec::with_capacity(grouped.len());
    for (id, (parent, columns, targets)) in grouped {
        // A NULL target means the constraint points at the parent's primary key
        let referenced_columns = if targets.iter().all(Option::is_some) {
            targets.into_iter().flatten().collect()
        } else {
            primary_key_columns(conn, &parent)?
        };

        foreign_keys.push(ForeignKeyInfo {
            name: format!("fk_{table_name}_{id}"),
            columns,
            referenced_table: parent,
            referenced_columns,
        });
    }

    Ok(foreign_keys)
}

/// Primary key columns of `table_name` in key order.
fn primary_key_columns(conn: &Connection, table_name: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")
        .map_err(|e| sqlite_error(format!("Failed to prepare table_info for {table_name}: {e}")))?;

    stmt.query_map([table_name], |row| row.get(0))
        .and_then(Iterator::collect)
        .map_err(|e| sqlite_error(format!("Failed to query primary key for {table_name}: {e}")))
}

fn run_batch(conn: &Connection, sql: &str, options: &ExecuteOptions) -> Result<QueryResult> {
    let mut result = QueryResult::default();

    for command in statement::split_statements(sql) {
        if statement::is_transaction_control(command) {
            continue;
        }

        let mut stmt = conn
            .prepare(command)
            .map_err(|e| MindsqlError::query_failed(format!("Failed to prepare query: {e}")))?;
        result.statements_executed += 1;

        if stmt.column_count() == 0 {
            let affected = stmt
                .execute([])
                .map_err(|e| MindsqlError::query_failed(format!("Failed to execute query: {e}")))?;
            result.add_affected(affected as u64);
            continue;
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();
        let width = columns.len();
        let mut rows = stmt
            .query([])
            .map_err(|e| MindsqlError::query_failed(format!("Failed to execute query: {e}")))?;

        let mut data = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| MindsqlError::query_failed(format!("Failed to fetch row: {e}")))?
        {
            if options.max_rows.is_some_and(|max| data.len() >= max) {
                break;
            }
            data.push(
                row_to_json(width, row)
                    .map_err(|e| MindsqlError::query_failed(format!("Failed to read row: {e}")))?,
            );
        }

        result.columns = columns;
        result.rows = data;
    }

    Ok(result)
}

fn row_to_json(width: usize, row: &Row) -> rusqlite::Result<Vec<serde_json::Value>> {
    (0..width).map(|idx| sqlite_value_to_json(row, idx)).collect()
}

fn sqlite_value_to_json(row: &Row, idx: usize) -> rusqlite::Result<serde_json::Value> {
    use rusqlite::types::ValueRef;

    Ok(match row.get_ref(idx)? {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        ValueRef::Text(s) => serde_json::Value::String(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => {
            use base64::Engine;
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
    })
}
