//! Query Analysis
//!
//! Extracts intent, entities and schema search phrases from the request.
//! The result is the request body sent to the RAG schema service.

use nlsql_core::parse_json_object;
use nlsql_llm::{complete, LlmProvider};
use serde_json::Value;
use tracing::debug;

use super::prompts::QUERY_ANALYZER_PROMPT;
use crate::utils::error::AppResult;

pub async fn analyze_query(provider: &dyn LlmProvider, user_text: &str) -> AppResult<Value> {
    let raw = complete(provider, QUERY_ANALYZER_PROMPT, user_text).await?;
    let analysis = parse_json_object(&raw)?;
    let intent = analysis
        .get("intent")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    debug!(intent, "query analyzed");
    Ok(Value::Object(analysis))
}
