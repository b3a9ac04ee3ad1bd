//! Generation Adapter
//!
//! One model call turning the request and schema context into a candidate
//! statement.

use nlsql_core::{first_string_field, parse_json_object, CoreError};
use nlsql_llm::{complete, LlmError, LlmProvider};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::prompts::{generation_message, SQL_GENERATOR_PROMPT};

/// Field names accepted for the generated SQL, in lookup order.
pub const GENERATION_SQL_FIELDS: &[&str] = &["sql_preview", "sql", "sql_full"];

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("SQL generator returned invalid JSON: {reason}")]
    InvalidJson { reason: String, raw: String },

    #[error("SQL generator request failed: {0}")]
    Provider(#[from] LlmError),
}

impl GenerationError {
    /// The model reply that failed to decode, if the model answered at all.
    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::InvalidJson { raw, .. } => Some(raw),
            Self::Provider(_) => None,
        }
    }
}

/// Decoded generation reply.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuery {
    /// Candidate SQL; empty when the model supplied none.
    pub sql: String,
    /// The whole decoded object, for callers that read extra fields.
    pub fields: Map<String, Value>,
}

/// Ask the model for a first candidate statement.
pub async fn generate(
    provider: &dyn LlmProvider,
    user_text: &str,
    schema_context: &Value,
) -> Result<GeneratedQuery, GenerationError> {
    let message = generation_message(user_text, schema_context);
    let raw = complete(provider, SQL_GENERATOR_PROMPT, &message).await?;
    debug!(reply_len = raw.len(), preview = %preview(&raw), "generation reply");
    parse_generation(&raw)
}

pub(crate) fn parse_generation(raw: &str) -> Result<GeneratedQuery, GenerationError> {
    let fields = parse_json_object(raw).map_err(|e| GenerationError::InvalidJson {
        reason: reason(&e),
        raw: raw.trim().to_string(),
    })?;
    let sql = first_string_field(&fields, GENERATION_SQL_FIELDS)
        .unwrap_or_default()
        .to_string();
    Ok(GeneratedQuery { sql, fields })
}

pub(crate) fn reason(err: &CoreError) -> String {
    match err {
        CoreError::Serialization(e) => e.to_string(),
        other => other.to_string(),
    }
}

/// First line of a reply, capped for log output.
pub(crate) fn preview(raw: &str) -> String {
    raw.lines().next().unwrap_or_default().chars().take(120).collect()
}
