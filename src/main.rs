//! MindSQL CLI Entry Point
//!
//! Subcommands:
//! - `connect` - Validate, save and sync a database connection
//! - `sync` - Rebuild the schema map and description file
//! - `extract` - Classify a model reply and extract its SQL
//! - `validate` - Check SQL against the schema map
//! - `plot-check` - Check the two-column chart shape
//! - `lookup` - Answer table/column questions from the schema map
//! - `run` - Full attempt: classify, extract, validate, optionally execute
//!
//! All output to stdout is JSON-only. Logs go to stderr (`MINDSQL_LOG` filter).

use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use mindsql::config::{self, ConfigLocation, MindsqlConfig};
use mindsql::engine::{execute_any, validate_any, ConnectionConfig, DatabaseType, ExecuteOptions};
use mindsql::pipeline::{self, execution_retry_context, Intent, Prepared};
use mindsql::{
    classify_reply, extract_sql, validate_plot, ErrorEnvelope, ErrorInfo, Metadata, MindsqlError,
    ModelReply, SchemaMap, SchemaStore, SchemaSynchronizer, SchemaValidator, SuccessEnvelope,
};

/// MindSQL - schema-grounded SQL from model replies
#[derive(Parser)]
#[command(name = "mindsql")]
#[command(about = "Extract, validate and run model-generated SQL against a live schema")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a connection, save it and sync its schema
    Connect {
        #[command(flatten)]
        target: TargetArgs,

        /// Name to save the connection under
        #[arg(long, default_value = "default")]
        name: String,

        /// Switch a saved connection to another database on the same server
        #[arg(long, value_name = "DATABASE", conflicts_with = "engine")]
        switch: Option<String>,

        /// Config file to save into
        #[arg(long, value_enum, default_value = "local")]
        save: ConfigLocation,
    },

    /// Rebuild the schema map and description file
    Sync {
        /// Saved connection (default connection if omitted)
        #[arg(long)]
        name: Option<String>,
    },

    /// Classify a model reply and extract its SQL (reply read from stdin)
    Extract,

    /// Check SQL against the schema (SQL from argument or stdin)
    Validate {
        sql: Option<String>,

        #[command(flatten)]
        schema: SchemaArgs,

        /// Reject SQL the parser cannot read
        #[arg(long)]
        strict: bool,
    },

    /// Check that SQL selects exactly a label and an aggregate
    PlotCheck { sql: Option<String> },

    /// Answer "list tables" / "describe <table>" questions from the schema map
    Lookup {
        question: String,

        #[command(flatten)]
        schema: SchemaArgs,
    },

    /// Process one model reply (read from stdin)
    Run {
        #[arg(long, value_enum, default_value = "strict")]
        intent: Intent,

        /// Execute the SQL when it passes validation (needs a connection, not `--map`)
        #[arg(long, conflicts_with = "map")]
        execute: bool,

        #[arg(long)]
        max_rows: Option<usize>,

        #[arg(long)]
        timeout_ms: Option<u64>,

        #[command(flatten)]
        schema: SchemaArgs,
    },
}

/// Explicit connection parameters
#[derive(Args)]
struct TargetArgs {
    #[arg(long)]
    engine: Option<DatabaseType>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Read the password from this environment variable; it is saved instead of the password
    #[arg(long)]
    password_env: Option<String>,

    #[arg(long)]
    database: Option<String>,

    #[arg(long)]
    file: Option<PathBuf>,
}

/// Where the schema map comes from
#[derive(Args)]
struct SchemaArgs {
    /// Saved connection to introspect (default connection if omitted)
    #[arg(long)]
    name: Option<String>,

    /// Schema map JSON file used instead of a live connection
    #[arg(long, value_name = "FILE", conflicts_with = "name")]
    map: Option<PathBuf>,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Sync { .. } => "sync",
            Self::Extract => "extract",
            Self::Validate { .. } => "validate",
            Self::PlotCheck { .. } => "plot-check",
            Self::Lookup { .. } => "lookup",
            Self::Run { .. } => "run",
        }
    }
}

/// Successful command output before timing is attached
struct Output {
    engine: String,
    data: Value,
    rows_returned: Option<usize>,
    schema_refreshed: bool,
}

impl Output {
    fn new(engine: impl Into<String>, data: Value) -> Self {
        Self { engine: engine.into(), data, rows_returned: None, schema_refreshed: false }
    }
}

/// Failed command: error info plus the engine if it was known
struct Failure {
    engine: String,
    error: ErrorInfo,
}

impl Failure {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self { engine: String::new(), error: ErrorInfo::new(code, message) }
    }

    fn on(mut self, engine: DatabaseType) -> Self {
        self.engine = engine.to_string();
        self
    }
}

impl From<MindsqlError> for Failure {
    fn from(err: MindsqlError) -> Self {
        Self { engine: String::new(), error: err.into() }
    }
}

type CommandResult = Result<Output, Failure>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let command = cli.command.name();
    let started = Instant::now();

    let outcome = dispatch(cli.command).await;
    let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match outcome {
        Ok(output) => {
            let meta = match output.rows_returned {
                Some(rows) => Metadata::with_rows(elapsed, rows),
                None => Metadata::new(elapsed),
            }
            .refreshed(output.schema_refreshed);
            print_json(&SuccessEnvelope::new(output.engine, command, output.data, meta))
        }
        Err(failure) => {
            print_json(&ErrorEnvelope::new(failure.engine, command, failure.error))?;
            process::exit(1);
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("MINDSQL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

async fn dispatch(command: Commands) -> CommandResult {
    match command {
        Commands::Connect { target, name, switch, save } => {
            connect(target, &name, switch.as_deref(), save).await
        }
        Commands::Sync { name } => sync(name.as_deref()).await,
        Commands::Extract => extract(&read_stdin()?),
        Commands::Validate { sql, schema, strict } => {
            let sql = sql_or_stdin(sql)?;
            validate(&sql, &schema, strict).await
        }
        Commands::PlotCheck { sql } => plot_check(&sql_or_stdin(sql)?),
        Commands::Lookup { question, schema } => lookup(&question, &schema).await,
        Commands::Run { intent, execute, max_rows, timeout_ms, schema } => {
            let reply = read_stdin()?;
            let options = ExecuteOptions { max_rows, timeout_ms };
            run(&reply, intent, execute.then_some(options), &schema).await
        }
    }
}

fn read_stdin() -> Result<String, Failure> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| MindsqlError::invalid_input(format!("Could not read stdin: {e}")))?;
    Ok(input)
}

fn sql_or_stdin(sql: Option<String>) -> Result<String, Failure> {
    match sql {
        Some(sql) => Ok(sql),
        None => read_stdin(),
    }
}

fn synchronizer(settings: &MindsqlConfig) -> SchemaSynchronizer {
    SchemaSynchronizer::new(Arc::new(SchemaStore::default()), settings.schema_file())
}

fn config_from_target(target: TargetArgs) -> Result<ConnectionConfig, Failure> {
    let Some(engine) = target.engine else {
        return Err(Failure::new("INVALID_INPUT", "--engine is required to connect"));
    };

    let password = match (&target.password, &target.password_env) {
        (Some(password), _) => Some(password.clone()),
        (None, Some(var)) => Some(std::env::var(var).map_err(|_| {
            MindsqlError::config_error(format!("Environment variable {var} not found for password"))
        })?),
        (None, None) => None,
    };

    Ok(ConnectionConfig {
        engine,
        host: target.host,
        port: target.port,
        user: target.user,
        password,
        database: target.database,
        file: target.file,
    })
}

async fn connect(
    target: TargetArgs,
    name: &str,
    switch: Option<&str>,
    save: ConfigLocation,
) -> CommandResult {
    let settings = config::load_with_precedence()?;

    let (connection, password_env) = match switch {
        Some(database) => {
            let saved = settings.connections.get(name).and_then(|s| s.password_env.clone());
            (settings.resolve(Some(name))?.with_database(database), saved)
        }
        None => {
            let password_env = target.password_env.clone();
            (config_from_target(target)?, password_env)
        }
    };
    let engine = connection.engine;

    let info = validate_any(&connection).await.map_err(|e| Failure::from(e).on(engine))?;
    tracing::info!(database = %connection.target(), "connected");

    config::save_connection(name, connection.clone(), password_env, save)?;

    let sync = synchronizer(&settings);
    sync.refresh_any(&connection).await.map_err(|e| Failure::from(e).on(engine))?;
    let map = sync.store().snapshot();

    let mut output = Output::new(
        engine.as_str(),
        json!({
            "connection": name,
            "target": connection.target(),
            "info": info,
            "tables": map.table_names().collect::<Vec<_>>(),
            "schema_file": sync.schema_file(),
        }),
    );
    output.schema_refreshed = true;
    Ok(output)
}

async fn sync(name: Option<&str>) -> CommandResult {
    let settings = config::load_with_precedence()?;
    let connection = settings.resolve(name)?;
    let engine = connection.engine;

    let sync = synchronizer(&settings);
    let description =
        sync.refresh_any(&connection).await.map_err(|e| Failure::from(e).on(engine))?;
    let map = sync.store().snapshot();

    let mut output = Output::new(
        engine.as_str(),
        json!({
            "tables": map.table_names().collect::<Vec<_>>(),
            "schema_file": sync.schema_file(),
            "description": description,
        }),
    );
    output.schema_refreshed = true;
    Ok(output)
}

fn extract(reply: &str) -> CommandResult {
    let data = match classify_reply(reply) {
        ModelReply::Clarification(message) => json!({"kind": "clarification", "message": message}),
        ModelReply::SchemaAnswer(message) => json!({"kind": "schema_answer", "message": message}),
        ModelReply::Text(text) => json!({"kind": "text", "sql": extract_sql(text)}),
    };
    Ok(Output::new("", data))
}

/// Schema map from a JSON file, or from introspecting a saved connection
async fn load_map(
    schema: &SchemaArgs,
    settings: &MindsqlConfig,
) -> Result<(SchemaMap, Option<ConnectionConfig>), Failure> {
    if let Some(path) = &schema.map {
        return Ok((read_map_file(path)?, None));
    }

    let connection = settings.resolve(schema.name.as_deref())?;
    let sync = synchronizer(settings);
    sync.refresh_any(&connection).await.map_err(|e| Failure::from(e).on(connection.engine))?;
    let map = SchemaMap::clone(&sync.store().snapshot());
    Ok((map, Some(connection)))
}

fn read_map_file(path: &Path) -> Result<SchemaMap, Failure> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        MindsqlError::invalid_input(format!("Could not read {}: {e}", path.display()))
    })?;
    let map = serde_json::from_str(&contents).map_err(|e| {
        MindsqlError::invalid_input(format!("Invalid schema map {}: {e}", path.display()))
    })?;
    Ok(map)
}

fn validator_for(
    settings: &MindsqlConfig,
    connection: Option<&ConnectionConfig>,
) -> SchemaValidator {
    let validator =
        connection.map_or_else(SchemaValidator::new, |c| SchemaValidator::for_engine(c.engine));
    validator.with_policy(settings.parse_failure())
}

fn engine_label(connection: Option<&ConnectionConfig>) -> &'static str {
    connection.map_or("", |c| c.engine.as_str())
}

async fn validate(sql: &str, schema: &SchemaArgs, strict: bool) -> CommandResult {
    let settings = config::load_with_precedence()?;
    let (map, connection) = load_map(schema, &settings).await?;

    let mut validator = validator_for(&settings, connection.as_ref());
    if strict {
        validator = validator.with_policy(mindsql::ParseFailurePolicy::Strict);
    }

    let engine = engine_label(connection.as_ref());
    match validator.check(sql, &map) {
        Ok(verdict) => {
            Ok(Output::new(engine, json!({"valid": true, "verdict": format!("{verdict:?}")})))
        }
        Err(violation) => {
            tracing::warn!(%violation, "validation failed");
            Err(Failure {
                engine: engine.to_string(),
                error: ErrorInfo::new("SCHEMA_VIOLATION", violation.to_string()),
            })
        }
    }
}

fn plot_check(sql: &str) -> CommandResult {
    if validate_plot(sql) {
        Ok(Output::new("", json!({"valid": true})))
    } else {
        Err(Failure::new("PLOT_SHAPE", "Invalid plot SQL. Must return LABEL + VALUE only."))
    }
}

async fn lookup(question: &str, schema: &SchemaArgs) -> CommandResult {
    let settings = config::load_with_precedence()?;
    let (map, connection) = load_map(schema, &settings).await?;
    let answer = pipeline::answer_from_schema(question, &map);
    Ok(Output::new(engine_label(connection.as_ref()), json!({"answer": answer})))
}

async fn run(
    reply: &str,
    intent: Intent,
    execute: Option<ExecuteOptions>,
    schema: &SchemaArgs,
) -> CommandResult {
    let settings = config::load_with_precedence()?;
    let (map, connection) = load_map(schema, &settings).await?;
    let validator = validator_for(&settings, connection.as_ref());
    let engine = engine_label(connection.as_ref());

    let sql = match pipeline::prepare(reply, intent, &map, &validator) {
        Prepared::Clarification(message) => {
            return Ok(Output::new(engine, json!({"status": "clarification", "message": message})));
        }
        Prepared::SchemaAnswer(message) => {
            return Ok(Output::new(engine, json!({"status": "schema_answer", "message": message})));
        }
        Prepared::NoSql(answer) => {
            return Ok(Output::new(engine, json!({"status": "answer", "message": answer})));
        }
        Prepared::Rejected { sql, rejection } => {
            return Ok(Output::new(
                engine,
                json!({
                    "status": "rejected",
                    "sql": sql,
                    "reason": rejection.to_string(),
                    "retryable": rejection.is_retryable(),
                    "retry_context": rejection.retry_context(&sql),
                }),
            ));
        }
        Prepared::Ready(sql) => sql,
    };

    let (Some(options), Some(connection)) = (execute, connection) else {
        return Ok(Output::new(engine, json!({"status": "ready", "sql": sql})));
    };

    let result = match execute_any(&connection, &sql, &options).await {
        Ok(result) => result,
        Err(e) => {
            let message = e.message();
            return Ok(Output::new(
                engine,
                json!({
                    "status": "execution_failed",
                    "sql": sql,
                    "error": {"code": e.error_code(), "message": message},
                    "retry_context": execution_retry_context(intent, &sql, &message),
                }),
            ));
        }
    };

    let refreshed = pipeline::needs_resync(&sql);
    if refreshed {
        tracing::info!("structural change detected, re-syncing schema");
        synchronizer(&settings)
            .refresh_any(&connection)
            .await
            .map_err(|e| Failure::from(e).on(connection.engine))?;
    }

    let rows_returned = result.returned_rows().then_some(result.rows.len());
    let mut output =
        Output::new(engine, json!({"status": "executed", "sql": sql, "result": result}));
    output.rows_returned = rows_returned;
    output.schema_refreshed = refreshed;
    Ok(output)
}
