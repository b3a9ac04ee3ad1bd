//! Repair Adapter
//!
//! Feeds a failed statement, its error and the attempt history back to the
//! model and decodes the corrected statement.

use nlsql_core::{
    first_string_field, parse_json_object, summary, transcript, Attempt, TranscriptLimits,
    DEFAULT_SUMMARY_ITEMS,
};
use nlsql_llm::{complete, LlmError, LlmProvider};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::generation::{preview, reason};
use super::prompts::{repair_message, RepairPromptParts, SQL_FIXER_PROMPT};

/// Field names accepted for the repaired SQL, in lookup order.
pub const REPAIR_SQL_FIELDS: &[&str] = &["sql", "sql_full", "sql_preview"];

#[derive(Error, Debug)]
pub enum RepairError {
    #[error("SQL fixer returned invalid JSON: {reason}")]
    InvalidJson { reason: String, raw: String },

    #[error("SQL fixer returned empty SQL.")]
    EmptySql { raw: String },

    #[error("SQL fixer request failed: {0}")]
    Provider(#[from] LlmError),
}

impl RepairError {
    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::InvalidJson { raw, .. } | Self::EmptySql { raw } => Some(raw),
            Self::Provider(_) => None,
        }
    }
}

/// Everything the repair call needs.
///
/// `attempts_summary` and `attempts_transcript` may be precomputed by the
/// caller; when absent they are rendered from `attempts` with default limits.
pub struct RepairRequest<'a> {
    pub user_text: &'a str,
    pub schema_context: &'a Value,
    pub prev_sql: &'a str,
    pub error_text: &'a str,
    pub attempts: &'a [Attempt],
    pub attempts_summary: Option<&'a str>,
    pub attempts_transcript: Option<&'a str>,
}

/// Decoded repair reply. `sql` is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairedQuery {
    pub sql: String,
    /// Empty when the model gave none.
    pub fix_notes: String,
    pub fields: Map<String, Value>,
}

pub async fn repair(
    provider: &dyn LlmProvider,
    request: &RepairRequest<'_>,
) -> Result<RepairedQuery, RepairError> {
    let summary_text = match request.attempts_summary {
        Some(s) => s.to_string(),
        None => summary(request.attempts, DEFAULT_SUMMARY_ITEMS),
    };
    let transcript_text = match request.attempts_transcript {
        Some(t) => t.to_string(),
        None => transcript(request.attempts, TranscriptLimits::default()),
    };

    let message = repair_message(&RepairPromptParts {
        user_text: request.user_text,
        schema_context: request.schema_context,
        prev_sql: request.prev_sql,
        error_text: request.error_text,
        attempts_summary: &summary_text,
        attempts_transcript: &transcript_text,
    });

    let raw = complete(provider, SQL_FIXER_PROMPT, &message).await?;
    debug!(reply_len = raw.len(), preview = %preview(&raw), "repair reply");
    parse_repair(&raw)
}

pub(crate) fn parse_repair(raw: &str) -> Result<RepairedQuery, RepairError> {
    let raw_trimmed = raw.trim();
    let mut fields = parse_json_object(raw).map_err(|e| RepairError::InvalidJson {
        reason: reason(&e),
        raw: raw_trimmed.to_string(),
    })?;

    let sql = match first_string_field(&fields, REPAIR_SQL_FIELDS) {
        Some(sql) => sql.to_string(),
        None => {
            return Err(RepairError::EmptySql {
                raw: raw_trimmed.to_string(),
            })
        }
    };
    let fix_notes = fields
        .get("fix_notes")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    fields.insert("sql".to_string(), Value::String(sql.clone()));
    fields.insert("fix_notes".to_string(), Value::String(fix_notes.clone()));

    Ok(RepairedQuery {
        sql,
        fix_notes,
        fields,
    })
}
