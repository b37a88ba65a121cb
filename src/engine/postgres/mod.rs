//! `PostgreSQL` Database Engine Implementation
//!
//! # Features
//! - Client-server connections via TCP
//! - Schema introspection via `information_schema` (current schema only)
//! - Multi-statement execution inside one transaction
//! - JSON/JSONB preserved as nested JSON, BYTEA Base64-encoded
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (async driver, requires tokio runtime)
//! - Timeouts enforced via `tokio::time::timeout`
//! - Row limits enforced in application code

use std::collections::BTreeMap;
use std::time::Duration;
use tokio_postgres::types::FromSql;
use tokio_postgres::{Client, Config, NoTls, Row, Transaction};

use crate::engine::{
    ColumnInfo, ConnectionConfig, ConnectionInfo, DatabaseEngine, DatabaseType, ExecuteOptions,
    ForeignKeyInfo, QueryResult, SchemaInfo, TableInfo,
};
use crate::error::{MindsqlError, Result};
use crate::statement;

/// `PostgreSQL` database engine implementation
pub struct PostgresEngine;

impl DatabaseEngine for PostgresEngine {
    async fn validate_connection(config: &ConnectionConfig) -> Result<ConnectionInfo> {
        let client = connect(config).await?;

        let row = client
            .query_one("SELECT version(), current_database(), current_user::text", &[])
            .await
            .map_err(|e| {
                MindsqlError::connection_failed(format!("Failed to query server info: {e}"))
            })?;

        let version_string: String = row.get(0);

        // "PostgreSQL 15.3 on x86_64..." -> "15.3"
        let database_version =
            version_string.split_whitespace().nth(1).unwrap_or("unknown").to_string();

        Ok(ConnectionInfo {
            database_version,
            server_info: version_string,
            connected_database: row.get(1),
            user: row.get(2),
        })
    }

    async fn introspect(config: &ConnectionConfig) -> Result<SchemaInfo> {
        let client = connect(config).await?;

        let row = client.query_one("SELECT current_schema()", &[]).await.map_err(|e| {
            postgres_error(format!("Failed to query current schema: {e}"))
        })?;
        let schema: String = row.get(0);

        let rows = client
            .query(
                "SELECT table_name::text
                 FROM information_schema.tables
                 WHERE table_schema = $1
                 AND table_type = 'BASE TABLE'
                 ORDER BY table_name",
                &[&schema],
            )
            .await
            .map_err(|e| {
                postgres_error(format!("Failed to list tables in schema '{schema}': {e}"))
            })?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.get(0);
            tables.push(TableInfo {
                columns: introspect_columns(&client, &schema, &name).await?,
                primary_key: introspect_primary_key(&client, &schema, &name).await?,
                foreign_keys: introspect_foreign_keys(&client, &schema, &name).await?,
                name,
            });
        }

        tracing::debug!(
            engine = "postgres",
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
        let mut client = connect(config).await?;

        let batch = async {
            let tx = client.transaction().await.map_err(|e| {
                MindsqlError::query_failed(format!("Failed to begin transaction: {e}"))
            })?;

            // Dropping an uncommitted transaction rolls it back.
            let result = run_batch(&tx, sql, options).await?;

            tx.commit()
                .await
                .map_err(|e| MindsqlError::query_failed(format!("Failed to commit: {e}")))?;
            Ok::<_, MindsqlError>(result)
        };

        match options.timeout_ms {
            Some(timeout_ms) => tokio::time::timeout(Duration::from_millis(timeout_ms), batch)
                .await
                .map_err(|_| {
                    MindsqlError::query_failed(format!("Query exceeded timeout of {timeout_ms}ms"))
                })?,
            None => batch.await,
        }
    }
}

fn postgres_error(detail: String) -> MindsqlError {
    MindsqlError::engine_error("postgres", detail)
}

async fn connect(config: &ConnectionConfig) -> Result<Client> {
    if config.engine != DatabaseType::Postgres {
        return Err(MindsqlError::invalid_input(format!(
            "Expected PostgreSQL engine, got {}",
            config.engine
        )));
    }

    let (client, connection) = build_pg_config(config)?.connect(NoTls).await.map_err(|e| {
        MindsqlError::connection_failed(format!("Failed to connect to PostgreSQL: {e}"))
    })?;

    // Connection errors are not logged to prevent credential leakage
    tokio::spawn(async move {
        let _ = connection.await;
    });

    Ok(client)
}

/// Build `PostgreSQL` connection config from `ConnectionConfig`
fn build_pg_config(config: &ConnectionConfig) -> Result<Config> {
    let host = config
        .host
        .as_ref()
        .ok_or_else(|| MindsqlError::invalid_input("PostgreSQL requires 'host' parameter"))?;

    let port = config
        .port
        .ok_or_else(|| MindsqlError::invalid_input("PostgreSQL requires 'port' parameter"))?;

    let user = config
        .user
        .as_ref()
        .ok_or_else(|| MindsqlError::invalid_input("PostgreSQL requires 'user' parameter"))?;

    let database = config
        .database
        .as_ref()
        .ok_or_else(|| MindsqlError::invalid_input("PostgreSQL requires 'database' parameter"))?;

    let mut pg_config = Config::new();
    pg_config.host(host).port(port).user(user).dbname(database);
    if let Some(password) = &config.password {
        pg_config.password(password);
    }

    Ok(pg_config)
}

async fn introspect_columns(
    client: &Client,
    schema: &str,
    table_name: &str,
) -> Result<Vec<ColumnInfo>> {
    let rows = client
        .query(
            "SELECT column_name::text, data_type::text, is_nullable::text
             FROM information_schema.columns
             WHERE table_schema = $1 AND table_name = $2
             ORDER BY ordinal_position",
            &[&schema, &table_name],
        )
        .await
        .map_err(|e| {
            postgres_error(format!("Failed to query columns for {schema}.{table_name}: {e}"))
        })?;

    Ok(rows
        .iter()
        .map(|row| ColumnInfo {
            name: row.get(0),
            data_type: row.get(1),
            nullable: row.get::<_, String>(2) == "YES",
        })
        .collect())
}

async fn introspect_primary_key(
    client: &Client,
    schema: &str,
    table_name: &str,
) -> Result<Vec<String>> {
    let rows = client
        .query(
            "SELECT kcu.column_name::text
             FROM information_schema.table_constraints tc
             JOIN information_schema.key_column_usage kcu
               ON tc.constraint_name = kcu.constraint_name
               AND tc.table_schema = kcu.table_schema
             WHERE tc.constraint_type = 'PRIMARY KEY'
               AND tc.table_schema = $1
               AND tc.table_name = $2
             ORDER BY kcu.ordinal_position",
            &[&schema, &table_name],
        )
        .await
        .map_err(|e| {
            postgres_error(format!("Failed to query primary key for {schema}.{table_name}: {e}"))
        })?;

    Ok(rows.iter().map(|row| row.get(0)).collect())
}

async fn introspect_foreign_keys(
    client: &Client,
    schema: &str,
    table_name: &str,
) -> Result<Vec<ForeignKeyInfo>> {
    // Pairs child and parent columns by position so composite keys line up
    let rows = client
        .query(
            "SELECT kcu.constraint_name::text, kcu.column_name::text,
                    ref.table_name::text, ref.column_name::text
             FROM information_schema.referential_constraints rc
             JOIN information_schema.key_column_usage kcu
               ON kcu.constraint_name = rc.constraint_name
               AND kcu.constraint_schema = rc.constraint_schema
             JOIN information_schema.key_column_usage ref
               ON ref.constraint_name = rc.unique_constraint_name
               AND ref.constraint_schema = rc.unique_constraint_schema
               AND ref.ordinal_position = kcu.position_in_unique_constraint
             WHERE kcu.table_schema = $1 AND kcu.table_name = $2
             ORDER BY kcu.constraint_name, kcu.ordinal_position",
            &[&schema, &table_name],
        )
        .await
        .map_err(|e| {
            postgres_error(format!("Failed to query foreign keys for {schema}.{table_name}: {e}"))
        })?;

    let mut grouped: BTreeMap<String, ForeignKeyInfo> = BTreeMap::new();
    for row in rows {
        let name: String = row.get(0);
        let entry = grouped.entry(name.clone()).or_insert_with(|| ForeignKeyInfo {
            name,
            columns: Vec::new(),
            referenced_table: row.get(2),
            referenced_columns: Vec::new(),
        });
        entry.columns.push(row.get(1));
        entry.referenced_columns.push(row.get(3));
    }

    Ok(grouped.into_values().collect())
}

async fn run_batch(
    client: &Transaction<'_>,
    sql: &str,
    options: &ExecuteOptions,
) -> Result<QueryResult> {
    let mut result = QueryResult::default();

    for command in statement::split_statements(sql) {
        if statement::is_transaction_control(command) {
            continue;
        }

        let stmt = client
            .prepare(command)
            .await
            .map_err(|e| MindsqlError::query_failed(format!("Failed to prepare query: {e}")))?;
        result.statements_executed += 1;

        if stmt.columns().is_empty() {
            let affected = client
                .execute(&stmt, &[])
                .await
                .map_err(|e| MindsqlError::query_failed(format!("Failed to execute query: {e}")))?;
            result.add_affected(affected);
            continue;
        }

        let rows = client
            .query(&stmt, &[])
            .await
            .map_err(|e| MindsqlError::query_failed(format!("Failed to execute query: {e}")))?;

        let limit = options.max_rows.unwrap_or(usize::MAX);
        result.columns = stmt.columns().iter().map(|c| c.name().to_string()).collect();
        result.rows = rows.iter().take(limit).map(row_to_json).collect::<Result<_>>()?;
    }

    Ok(result)
}

fn row_to_json(row: &Row) -> Result<Vec<serde_json::Value>> {
    (0..row.len()).map(|idx| postgres_value_to_json(row, idx)).collect()
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, kind: &str) -> Result<Option<T>> {
    row.try_get(idx)
        .map_err(|e| MindsqlError::query_failed(format!("Failed to get {kind} value: {e}")))
}

fn number(value: Option<impl Into<serde_json::Number>>) -> serde_json::Value {
    value.map_or(serde_json::Value::Null, |v| serde_json::Value::Number(v.into()))
}

fn float(value: Option<f64>) -> serde_json::Value {
    // NaN and infinities have no JSON representation
    value
        .and_then(serde_json::Number::from_f64)
        .map_or(serde_json::Value::Null, serde_json::Value::Number)
}

fn text(value: Option<String>) -> serde_json::Value {
    value.map_or(serde_json::Value::Null, serde_json::Value::String)
}

/// Convert `PostgreSQL` value to JSON value
fn postgres_value_to_json(row: &Row, idx: usize) -> Result<serde_json::Value> {
    use tokio_postgres::types::Type;

    let col_type = row.columns()[idx].type_();

    let value = match *col_type {
        Type::BOOL => get::<bool>(row, idx, "boolean")?
            .map_or(serde_json::Value::Null, serde_json::Value::Bool),
        Type::INT2 => number(get::<i16>(row, idx, "i16")?),
        Type::INT4 => number(get::<i32>(row, idx, "i32")?),
        Type::INT8 => number(get::<i64>(row, idx, "i64")?),
        Type::FLOAT4 => float(get::<f32>(row, idx, "f32")?.map(f64::from)),
        Type::FLOAT8 => float(get::<f64>(row, idx, "f64")?),
        Type::VARCHAR | Type::TEXT | Type::BPCHAR | Type::NAME => {
            text(get::<String>(row, idx, "string")?)
        }
        Type::JSON | Type::JSONB => {
            get::<serde_json::Value>(row, idx, "JSON")?.unwrap_or(serde_json::Value::Null)
        }
        Type::BYTEA => {
            use base64::Engine;
            text(
                get::<Vec<u8>>(row, idx, "bytea")?
                    .map(|b| base64::engine::general_purpose::STANDARD.encode(b)),
            )
        }
        Type::TIMESTAMP => text(
            get::<chrono::NaiveDateTime>(row, idx, "timestamp")?
                .map(|v| v.format("%Y-%m-%dT%H:%M:%S").to_string()),
        ),
        Type::TIMESTAMPTZ => text(
            get::<chrono::DateTime<chrono::Utc>>(row, idx, "timestamptz")?.map(|v| v.to_rfc3339()),
        ),
        Type::DATE => text(
            get::<chrono::NaiveDate>(row, idx, "date")?.map(|v| v.format("%Y-%m-%d").to_string()),
        ),
        Type::TIME => text(
            get::<chrono::NaiveTime>(row, idx, "time")?.map(|v| v.format("%H:%M:%S").to_string()),
        ),
        Type::UUID => text(get::<uuid::Uuid>(row, idx, "UUID")?.map(|v| v.to_string())),
        _ => text(row.try_get::<_, Option<String>>(idx).map_err(|e| {
            MindsqlError::query_failed(format!(
                "Failed to convert PostgreSQL type '{}' to JSON: {e}",
                col_type.name()
            ))
        })?),
    };

    Ok(value)
}
