//! SQL Extraction from Model Replies
//!
//! Model output is free text: SQL may sit inside a markdown fence, be preceded by
//! narrative, or be followed by hallucinated non-SQL lines. [`extract_sql`] pulls out
//! only the statements worth sending to the validator.
//!
//! # Strategy (first match wins)
//! 1. A fence tagged `sql` (case-insensitive): its trimmed interior
//! 2. Any fence: its trimmed interior, minus a lone info-string word
//! 3. Raw text split on `;`, keeping segments that start with a SQL keyword
//! 4. The whole trimmed text if it starts with a SQL keyword
//! 5. Nothing
//!
//! Sentinel replies (`CLARIFICATION_NEEDED:`, `SCHEMA_ANSWER:`) are recognized by
//! [`classify_reply`] and must never reach the extractor.

use crate::statement;

/// Prefix a model uses when it cannot answer without more information
pub const CLARIFICATION_SENTINEL: &str = "CLARIFICATION_NEEDED:";

/// Prefix a model uses when it answers a structural question in prose
pub const SCHEMA_ANSWER_SENTINEL: &str = "SCHEMA_ANSWER:";

const FENCE: &str = "```";

/// A raw model reply, sorted by sentinel prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelReply<'a> {
    /// Model asked for more information; carries the trimmed explanation
    Clarification(&'a str),
    /// Model answered a structural question; carries the trimmed answer
    SchemaAnswer(&'a str),
    /// Anything else, possibly containing SQL
    Text(&'a str),
}

/// Sort a reply by its sentinel prefix (leading whitespace ignored)
#[must_use]
pub fn classify_reply(text: &str) -> ModelReply<'_> {
    let start = text.trim_start();
    if let Some(rest) = start.strip_prefix(CLARIFICATION_SENTINEL) {
        ModelReply::Clarification(rest.trim())
    } else if let Some(rest) = start.strip_prefix(SCHEMA_ANSWER_SENTINEL) {
        ModelReply::SchemaAnswer(rest.trim())
    } else {
        ModelReply::Text(text)
    }
}

/// Extract clean SQL from a model reply, or `None` when there is none.
///
/// Multi-statement raw text comes back rejoined with `;\n` and a trailing `;`.
#[must_use]
pub fn extract_sql(text: &str) -> Option<String> {
    let fences = fenced_blocks(text);

    if let Some(block) = fences.iter().find(|b| b.is_tagged_sql()) {
        tracing::debug!(strategy = "sql-fence", "extracted SQL");
        return Some(block.tagged_body().to_string());
    }

    if let Some(block) = fences.first() {
        tracing::debug!(strategy = "fence", "extracted SQL");
        return Some(block.untagged_body().to_string());
    }

    let clean = text.trim();
    let statements: Vec<&str> = statement::split_statements(clean)
        .into_iter()
        .filter(|s| statement::is_sql_start(s))
        .collect();

    if !statements.is_empty() {
        tracing::debug!(strategy = "raw", statements = statements.len(), "extracted SQL");
        return Some(format!("{};", statements.join(";\n")));
    }

    if statement::is_sql_start(clean) {
        return Some(clean.to_string());
    }

    None
}

/// Raw interior of one fenced block, between the opening and closing fence
#[derive(Debug, Clone, Copy)]
struct FencedBlock<'a> {
    raw: &'a str,
}

impl<'a> FencedBlock<'a> {
    /// Word glued to the opening fence, e.g. `sql` in "```sql"
    fn info_word(&self) -> &'a str {
        let end = self
            .raw
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+')))
            .unwrap_or(self.raw.len());
        &self.raw[..end]
    }

    fn is_tagged_sql(&self) -> bool {
        self.info_word().eq_ignore_ascii_case("sql")
    }

    fn tagged_body(&self) -> &'a str {
        self.raw[self.info_word().len()..].trim()
    }

    /// Interior with a lone info-string word on the opening line removed
    fn untagged_body(&self) -> &'a str {
        let word = self.info_word();
        let rest = &self.raw[word.len()..];
        let lone = !word.is_empty()
            && rest.lines().next().is_some_and(|line| line.trim().is_empty())
            && !statement::is_sql_start(word);

        if lone {
            rest.trim()
        } else {
            self.raw.trim()
        }
    }
}

/// All complete fenced blocks, pairing fences in order of appearance
fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let Some(close) = after_open.find(FENCE) else {
            break;
        };
        blocks.push(FencedBlock { raw: &after_open[..close] });
        rest = &after_open[close + FENCE.len()..];
    }

    blocks
}
