//! MySQL Database Engine Implementation
//!
//! Covers MySQL and MariaDB.
//!
//! # Implementation Notes
//! - Uses `mysql_async` (async driver, requires tokio runtime)
//! - DDL causes an implicit commit in MySQL, so a failed batch only rolls back
//!   the statements after the last DDL
//! - Row-returning statements are detected by leading keyword
//! - BLOB data that is not valid UTF-8 is Base64-encoded for JSON safety
//! - Timeouts enforced via `tokio::time::timeout`

use mysql_async::{prelude::*, Conn, OptsBuilder, Row, Transaction, TxOpts, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::engine::{
    ColumnInfo, ConnectionConfig, ConnectionInfo, DatabaseEngine, DatabaseType, ExecuteOptions,
    ForeignKeyInfo, QueryResult, SchemaInfo, TableInfo,
};
use crate::error::{MindsqlError, Result};
use crate::statement;

/// MySQL database engine implementation
pub struct MySqlEngine;

impl DatabaseEngine for MySqlEngine {
    async fn validate_connection(config: &ConnectionConfig) -> Result<ConnectionInfo> {
        let mut conn = connect(config).await?;

        let row = conn
            .query_first::<(String, Option<String>, String), _>(
                "SELECT VERSION(), DATABASE(), CURRENT_USER()",
            )
            .await
            .map_err(|e| {
                MindsqlError::connection_failed(format!("Failed to query server info: {e}"))
            })?
            .ok_or_else(|| MindsqlError::connection_failed("No server info returned"))?;

        let (database_version, server_info) = parse_mysql_version(&row.0);

        conn.disconnect()
            .await
            .map_err(|e| MindsqlError::connection_failed(format!("Failed to disconnect: {e}")))?;

        Ok(ConnectionInfo {
            database_version,
            server_info,
            connected_database: row.1.unwrap_or_default(),
            user: row.2,
        })
    }

    async fn introspect(config: &ConnectionConfig) -> Result<SchemaInfo> {
        let mut conn = connect(config).await?;

        let schema = conn
            .query_first::<Option<String>, _>("SELECT DATABASE()")
            .await
            .map_err(|e| mysql_error(format!("Failed to query current database: {e}")))?
            .flatten()
            .ok_or_else(|| mysql_error("No database selected".to_string()))?;

        let table_names: Vec<String> = conn
            .exec(
                "SELECT table_name
                 FROM information_schema.tables
                 WHERE table_schema = ?
                 AND table_type = 'BASE TABLE'
                 ORDER BY table_name",
                (&schema,),
            )
            .await
            .map_err(|e| mysql_error(format!("Failed to query tables: {e}")))?;

        let mut tables = Vec::with_capacity(table_names.len());
        for name in table_names {
            tables.push(TableInfo {
                columns: introspect_columns(&mut conn, &schema, &name).await?,
                primary_key: introspect_primary_key(&mut conn, &schema, &name).await?,
                foreign_keys: introspect_foreign_keys(&mut conn, &schema, &name).await?,
                name,
            });
        }

        conn.disconnect()
            .await
            .map_err(|e| mysql_error(format!("Failed to disconnect: {e}")))?;

        tracing::debug!(
            engine = "mysql",
            schema = %schema,
            tables = tables.len(),
            "introspection complete"
        );
        Ok(SchemaInfo { tables })
    }

    async fn execute(
        config: &ConnectionConfig,
        sql: &str,
        options: &ExecuteOptions,
    ) -> Result<QueryResult> {
        let mut conn = connect(config).await?;

        let batch = async {
            let mut tx = conn.start_transaction(TxOpts::default()).await.map_err(|e| {
                MindsqlError::query_failed(format!("Failed to begin transaction: {e}"))
            })?;

            // Dropping an uncommitted transaction rolls it back.
            let result = run_batch(&mut tx, sql, options).await?;

            tx.commit()
                .await
                .map_err(|e| MindsqlError::query_failed(format!("Failed to commit: {e}")))?;
            Ok::<_, MindsqlError>(result)
        };

        let result = match options.timeout_ms {
            Some(timeout_ms) => tokio::time::timeout(Duration::from_millis(timeout_ms), batch)
                .await
                .map_err(|_| {
                    MindsqlError::query_failed(format!("Query exceeded timeout of {timeout_ms}ms"))
                })?,
            None => batch.await,
        }?;

        conn.disconnect()
            .await
            .map_err(|e| mysql_error(format!("Failed to disconnect: {e}")))?;

        Ok(result)
    }
}

fn mysql_error(detail: String) -> MindsqlError {
    MindsqlError::engine_error("mysql", detail)
}

async fn connect(config: &ConnectionConfig) -> Result<Conn> {
    if config.engine != DatabaseType::MySQL {
        return Err(MindsqlError::invalid_input(format!(
            "Expected MySQL engine, got {}",
            config.engine
        )));
    }

    Conn::new(build_mysql_opts(config)?)
        .await
        .map_err(|e| MindsqlError::connection_failed(format!("Failed to connect to MySQL: {e}")))
}

/// Build MySQL connection options from `ConnectionConfig`
fn build_mysql_opts(config: &ConnectionConfig) -> Result<OptsBuilder> {
    let host = config
        .host
        .as_ref()
        .ok_or_else(|| MindsqlError::invalid_input("MySQL requires 'host' parameter"))?;

    let port = config
        .port
        .ok_or_else(|| MindsqlError::invalid_input("MySQL requires 'port' parameter"))?;

    let user = config
        .user
        .as_ref()
        .ok_or_else(|| MindsqlError::invalid_input("MySQL requires 'user' parameter"))?;

    let database = config
        .database
        .as_ref()
        .ok_or_else(|| MindsqlError::invalid_input("MySQL requires 'database' parameter"))?;

    Ok(OptsBuilder::default()
        .ip_or_hostname(host)
        .tcp_port(port)
        .user(Some(user))
        .pass(config.password.as_ref())
        .db_name(Some(database)))
}

/// Split a server version string into (version, banner), detecting MariaDB
fn parse_mysql_version(version_string: &str) -> (String, String) {
    // "8.0.35" or "10.11.2-MariaDB"
    if version_string.to_uppercase().contains("MARIADB") {
        let version = version_string.split('-').next().unwrap_or("unknown").to_string();
        let banner = format!("MariaDB {version}");
        (version, banner)
    } else {
        let version =
            version_string.split_whitespace().next().unwrap_or(version_string).to_string();
        let banner = format!("MySQL {version}");
        (version, banner)
    }
}

async fn introspect_columns(
    conn: &mut Conn,
    schema: &str,
    table_name: &str,
) -> Result<Vec<ColumnInfo>> {
    // column_type keeps length and precision, e.g. varchar(100)
    let rows: Vec<(String, String, String)> = conn
        .exec(
            "SELECT column_name, column_type, is_nullable
             FROM information_schema.columns
             WHERE table_schema = ? AND table_name = ?
             ORDER BY ordinal_position",
            (schema, table_name),
        )
        .await
        .map_err(|e| {
            mysql_error(format!("Failed to query columns for {schema}.{table_name}: {e}"))
        })?;

    Ok(rows
        .into_iter()
        .map(|(name, data_type, is_nullable)| ColumnInfo {
            name,
            data_type,
            nullable: is_nullable == "YES",
        })
        .collect())
}

async fn introspect_primary_key(
    conn: &mut Conn,
    schema: &str,
    table_name: &str,
) -> Result<Vec<String>> {
    conn.exec(
        "SELECT column_name
         FROM information_schema.key_column_usage
         WHERE table_schema = ?
         AND table_name = ?
         AND constraint_name = 'PRIMARY'
         ORDER BY ordinal_position",
        (schema, table_name),
    )
    .await
    .map_err(|e| mysql_error(format!("Failed to query primary key for {schema}.{table_name}: {e}")))
}

async fn introspect_foreign_keys(
    conn: &mut Conn,
    schema: &str,
    table_name: &str,
) -> Result<Vec<ForeignKeyInfo>> {
    let rows: Vec<(String, String, String, String)> = conn
        .exec(
            "SELECT constraint_name, column_name, referenced_table_name, referenced_column_name
             FROM information_schema.key_column_usage
             WHERE table_schema = ?
             AND table_name = ?
             AND referenced_table_name IS NOT NULL
             ORDER BY constraint_name, ordinal_position",
            (schema, table_name),
        )
        .await
        .map_err(|e| {
            mysql_error(format!("Failed to query foreign keys for {schema}.{table_name}: {e}"))
        })?;

    let mut grouped: BTreeMap<String, ForeignKeyInfo> = BTreeMap::new();
    for (name, column, referenced_table, referenced_column) in rows {
        let entry = grouped.entry(name.clone()).or_insert_with(|| ForeignKeyInfo {
            name,
            columns: Vec::new(),
            referenced_table,
            referenced_columns: Vec::new(),
        });
        entry.columns.push(column);
        entry.referenced_columns.push(referenced_column);
    }

    Ok(grouped.into_values().collect())
}

async fn run_batch(
    tx: &mut Transaction<'_>,
    sql: &str,
    options: &ExecuteOptions,
) -> Result<QueryResult> {
    let mut result = QueryResult::default();

    for command in statement::split_statements(sql) {
        if statement::is_transaction_control(command) {
            continue;
        }
        result.statements_executed += 1;

        // mysql_async has no prepare-then-inspect step, so the keyword decides
        if statement::returns_rows(command) {
            let rows: Vec<Row> = tx.query(command).await.map_err(|e| {
                MindsqlError::query_failed(format!("Failed to execute query: {e}"))
            })?;

            result.columns = rows.first().map_or_else(Vec::new, |first| {
                first.columns_ref().iter().map(|c| c.name_str().to_string()).collect()
            });
            let limit = options.max_rows.unwrap_or(usize::MAX);
            result.rows =
                rows.iter().take(limit).map(row_to_json).collect::<Result<Vec<_>>>()?;
        } else {
            let outcome = tx.query_iter(command).await.map_err(|e| {
                MindsqlError::query_failed(format!("Failed to execute query: {e}"))
            })?;
            result.add_affected(outcome.affected_rows());
            outcome.drop_result().await.map_err(|e| {
                MindsqlError::query_failed(format!("Failed to finish query: {e}"))
            })?;
        }
    }

    Ok(result)
}

fn row_to_json(row: &Row) -> Result<Vec<serde_json::Value>> {
    (0..row.len()).map(|idx| mysql_value_to_json(row, idx)).collect()
}

/// Convert MySQL value to JSON value
fn mysql_value_to_json(row: &Row, idx: usize) -> Result<serde_json::Value> {
    let value = row
        .as_ref(idx)
        .ok_or_else(|| MindsqlError::query_failed(format!("Failed to get value at index {idx}")))?;

    let json_value = match value {
        Value::NULL => serde_json::Value::Null,

        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => serde_json::Value::String(s.to_string()),
            Err(_) => {
                use base64::Engine;
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        },

        Value::Int(i) => serde_json::Value::Number((*i).into()),

        Value::UInt(u) => serde_json::Value::Number((*u).into()),

        Value::Float(f) => serde_json::Number::from_f64(f64::from(*f))
            .map_or(serde_json::Value::Null, serde_json::Value::Number),

        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),

        Value::Date(year, month, day, hour, minute, second, micro) => serde_json::Value::String(
            format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micro:06}"),
        ),

        Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            serde_json::Value::String(format!(
                "{sign}{total_hours}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    };

    Ok(json_value)
}
