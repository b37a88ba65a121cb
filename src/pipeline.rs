//! Reply Pipeline
//!
//! Composes reply classification, SQL extraction and validation into the single
//! decision a caller acts on for one model attempt, and renders the feedback a caller
//! appends to its next prompt when an attempt is rejected or fails to execute.
//!
//! # Intents
//! - [`Intent::Strict`]: the reply should be SQL; a reply without extractable SQL is
//!   taken verbatim as the candidate
//! - [`Intent::Answer`]: the reply is prose that may suggest SQL; no SQL is fine
//! - [`Intent::Plot`]: like `Strict`, plus the two-column chart shape check
//!
//! Structural questions ("list all tables", "describe users") can be answered straight
//! from the schema map with [`answer_from_schema`], without a model round trip.

use serde::Serialize;

use crate::extract::{classify_reply, extract_sql, ModelReply};
use crate::schema::SchemaMap;
use crate::statement;
use crate::validate::{validate_plot, SchemaValidator, Violation};

/// Attempts a caller makes before giving up on a question
pub const MAX_ATTEMPTS: usize = 3;

/// What the caller asked the model for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    #[default]
    Strict,
    Answer,
    Plot,
}

/// Why an extracted candidate was turned down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Not a `SELECT label, AGG(...)` chart query
    PlotShape,
    /// Chart query referencing unknown tables or columns
    PlotSchema(Violation),
    /// Query referencing unknown tables or columns
    Schema(Violation),
}

impl Rejection {
    /// Whether asking the model again can fix this
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::PlotShape)
    }

    #[must_use]
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Self::PlotShape => None,
            Self::PlotSchema(v) | Self::Schema(v) => Some(v),
        }
    }

    /// Feedback appended to the next prompt after this rejection of `sql`
    #[must_use]
    pub fn retry_context(&self, sql: &str) -> String {
        match self {
            Self::PlotShape => format!(
                "\n\n⚠ Failed SQL: {sql}\nError: Invalid plot SQL. Must return LABEL + VALUE only."
            ),
            Self::PlotSchema(_) => format!(
                "\n\n⚠ Failed SQL: {sql}\nError: You used an invalid table or column. Re-read Context."
            ),
            Self::Schema(_) => format!(
                "\n\n⚠ WARNING: Your previous attempt failed validation.\nFailed SQL: {sql}\n\
                 Error: You used a column or table that does not exist. \
                 Re-read the Context exactly and fix the aliases/columns."
            ),
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlotShape => f.write_str("Invalid plot SQL. Must return LABEL + VALUE only."),
            Self::PlotSchema(v) | Self::Schema(v) => write!(f, "{v}"),
        }
    }
}

/// Feedback appended to the next prompt after `sql` failed in the database
#[must_use]
pub fn execution_retry_context(intent: Intent, sql: &str, error: &str) -> String {
    match intent {
        Intent::Plot => format!("\n\n⚠ Database Error: {error}\nFix the query logic."),
        Intent::Strict | Intent::Answer => format!(
            "\n\n⚠ WARNING: Your previous execution failed.\nFailed SQL: {sql}\n\
             Database Error: {error}\nRe-read the Context and fix the logic."
        ),
    }
}

/// Outcome of one model attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prepared {
    /// Model needs more information; stop and show the message
    Clarification(String),
    /// Model answered a structural question in prose
    SchemaAnswer(String),
    /// Prose answer with no SQL in it
    NoSql(String),
    /// Candidate SQL failed a check
    Rejected { sql: String, rejection: Rejection },
    /// SQL that passed every check
    Ready(String),
}

/// Classify, extract and validate one model reply
pub fn prepare(
    reply: &str,
    intent: Intent,
    map: &SchemaMap,
    validator: &SchemaValidator,
) -> Prepared {
    let text = match classify_reply(reply) {
        ModelReply::Clarification(msg) => return Prepared::Clarification(msg.to_string()),
        ModelReply::SchemaAnswer(msg) => return Prepared::SchemaAnswer(msg.to_string()),
        ModelReply::Text(text) => text,
    };

    let sql = match (extract_sql(text), intent) {
        (Some(sql), _) => sql,
        (None, Intent::Answer) => return Prepared::NoSql(text.trim().to_string()),
        (None, Intent::Strict | Intent::Plot) => text.trim().to_string(),
    };

    if intent == Intent::Plot && !validate_plot(&sql) {
        tracing::debug!("plot shape rejected");
        return Prepared::Rejected { sql, rejection: Rejection::PlotShape };
    }

    match validator.check(&sql, map) {
        Ok(verdict) => {
            tracing::debug!(?verdict, "candidate accepted");
            Prepared::Ready(sql)
        }
        Err(violation) => {
            tracing::warn!(%violation, "candidate rejected");
            let rejection = match intent {
                Intent::Plot => Rejection::PlotSchema(violation),
                Intent::Strict | Intent::Answer => Rejection::Schema(violation),
            };
            Prepared::Rejected { sql, rejection }
        }
    }
}

/// Executing `sql` changes the schema, so the map must be rebuilt afterwards
#[must_use]
pub fn needs_resync(sql: &str) -> bool {
    statement::is_structural_change(sql)
}

/// Structural question answered from the schema map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaLookup {
    Tables { tables: Vec<String> },
    Columns { table: String, columns: Vec<String> },
}

/// Answer "what tables are there" / "describe <table>" questions locally
///
/// Returns `None` for anything else, including column questions naming no known
/// table.
#[must_use]
pub fn answer_from_schema(question: &str, map: &SchemaMap) -> Option<SchemaLookup> {
    let lower = question.to_lowercase();

    if lower.contains("tables") && ["what", "list", "show", "all"].iter().any(|w| lower.contains(w))
    {
        return Some(SchemaLookup::Tables { tables: map.table_names().map(String::from).collect() });
    }

    if ["columns", "describe", "what is in"].iter().any(|w| lower.contains(w)) {
        return map
            .iter()
            .find(|(name, _)| lower.contains(&name.to_lowercase()))
            .map(|(name, table)| SchemaLookup::Columns {
                table: name.to_string(),
                columns: table.columns.clone(),
            });
    }

    None
}
