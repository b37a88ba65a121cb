//! Extraction, Validation and Sync Benchmarks
//!
//! Measures the per-attempt cost a caller pays before anything reaches the database:
//! - SQL extraction from fenced and raw replies
//! - Schema validation of simple and join-heavy queries against a wide map
//! - Full schema sync of a scratch `SQLite` database

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mindsql::{extract_sql, SchemaMap, SchemaValidator};

fn wide_map() -> SchemaMap {
    (0..200)
        .map(|t| {
            let columns: Vec<String> = (0..30).map(|c| format!("col_{c}")).collect();
            (format!("table_{t}"), columns)
        })
        .chain(
            [("users", ["id", "name", "age"]), ("orders", ["id", "user_id", "total"])].map(
                |(name, columns)| (name.to_string(), columns.map(String::from).to_vec()),
            ),
        )
        .collect()
}

fn bench_extract(c: &mut Criterion) {
    let fenced = "Here is the query you asked for:\n\
                  ```sql\nSELECT name FROM users WHERE age > 30\n```\nIt filters by age.";
    let raw = "SELECT name FROM users; UPDATE users SET age = 31 WHERE id = 1; Explanation: done";

    c.bench_function("extract_fenced", |b| b.iter(|| extract_sql(black_box(fenced))));
    c.bench_function("extract_raw", |b| b.iter(|| extract_sql(black_box(raw))));
}

fn bench_validate(c: &mut Criterion) {
    let map = wide_map();
    let validator = SchemaValidator::new();

    c.bench_function("validate_simple", |b| {
        b.iter(|| validator.validate(black_box("SELECT name FROM users WHERE age > 30"), &map));
    });

    let join = "WITH spend AS (SELECT user_id, SUM(total) AS spent FROM orders GROUP BY user_id) \
                SELECT u.name, s.spent FROM users u JOIN spend s ON s.user_id = u.id \
                WHERE u.age > 21 ORDER BY s.spent DESC LIMIT 10";
    c.bench_function("validate_cte_join", |b| {
        b.iter(|| validator.validate(black_box(join), &map));
    });
}

#[cfg(feature = "sqlite")]
fn bench_sync(c: &mut Criterion) {
    use mindsql::{ConnectionConfig, SchemaStore, SchemaSynchronizer};
    use std::sync::Arc;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = dir.path().join("bench_sync.db");
    {
        let conn = rusqlite::Connection::open(&db).expect("Failed to create database");
        for t in 0..50 {
            let ddl = format!(
                "CREATE TABLE t{t} (id INTEGER PRIMARY KEY, name TEXT, \
                 parent INTEGER REFERENCES t0(id))"
            );
            conn.execute(&ddl, [])
            .expect("Failed to create table");
        }
    }

    let config = ConnectionConfig::sqlite(db);
    let sync =
        SchemaSynchronizer::new(Arc::new(SchemaStore::default()), dir.path().join("schema.txt"));
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");

    c.bench_function("sqlite_sync_50_tables", |b| {
        b.iter(|| {
            let result = runtime.block_on(sync.refresh_any(black_box(&config)));
            assert!(result.is_ok());
            result
        });
    });
}

#[cfg(feature = "sqlite")]
criterion_group!(benches, bench_extract, bench_validate, bench_sync);

#[cfg(not(feature = "sqlite"))]
criterion_group!(benches, bench_extract, bench_validate);

criterion_main!(benches);
