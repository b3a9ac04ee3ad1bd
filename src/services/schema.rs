//! Schema Context Providers
//!
//! The model sees the database through a schema-context JSON object. It comes
//! either from a RAG schema service, which selects the relevant tables for
//! the analysed request, or from local SQLite introspection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nlsql_executor::SqliteExecutor;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::models::settings::SchemaServiceSettings;
use crate::utils::error::{AppError, AppResult};

/// Longest slice of a response body quoted in an error.
const ERROR_BODY_CHARS: usize = 500;

/// Anything able to describe the database to the model.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Schema context for one request. `analysis` is the output of query
    /// analysis when it ran.
    async fn schema_context(&self, user_text: &str, analysis: Option<&Value>) -> AppResult<Value>;
}

// ── RAG Service ────────────────────────────────────────────────────────

/// Executed query sent to the history index.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    pub db_fingerprint: String,
    pub user_query: String,
    pub sql: String,
    pub tables_used: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_count: Option<usize>,
}

/// Similar-query lookup against the history index.
#[derive(Debug, Clone, Serialize)]
pub struct HistorySearch {
    pub db_fingerprint: String,
    pub user_query: String,
    pub tables_filter: Vec<String>,
    pub top_k: usize,
}

/// HTTP client for the RAG schema/history service.
#[derive(Clone)]
pub struct RagSchemaService {
    client: reqwest::Client,
    base_url: String,
}

impl RagSchemaService {
    pub fn new(settings: &SchemaServiceSettings) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// POST `payload` and return the status and raw body.
    async fn post<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        payload: &T,
    ) -> AppResult<(StatusCode, String)> {
        let url = self.url(endpoint);
        debug!(url = %url, "schema service request");

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::schema_service(format!("{} request failed: {}", endpoint, e)))?;

        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    /// Fetch the schema context selected for an analysed request.
    pub async fn fetch_schema(&self, analysis: &Value) -> AppResult<Value> {
        let (status, body) = self.post("/schema", analysis).await?;
        let payload = decode_json_reply("/schema", status, &body)?;
        let schema = parse_schema_payload(payload)?;
        info!(
            tables = schema["tables"].as_object().map(|t| t.len()).unwrap_or(0),
            "schema fetched from RAG service"
        );
        Ok(schema)
    }

    /// Record a successfully executed query.
    pub async fn ingest_history(&self, record: &HistoryRecord) -> AppResult<Value> {
        let (status, body) = self.post("/rag/history/ingest", record).await?;
        decode_ingest_reply(status, &body)
    }

    /// Find earlier queries similar to this one.
    pub async fn search_history(&self, search: &HistorySearch) -> AppResult<Vec<Value>> {
        let (status, body) = self.post("/rag/history/search", search).await?;
        let payload = decode_json_reply("/rag/history/search", status, &body)?;
        Ok(parse_search_payload(payload))
    }
}

#[async_trait]
impl SchemaSource for RagSchemaService {
    async fn schema_context(&self, user_text: &str, analysis: Option<&Value>) -> AppResult<Value> {
        match analysis {
            Some(analysis) => self.fetch_schema(analysis).await,
            None => {
                let fallback = json!({
                    "intent": "unknown",
                    "keywords": [],
                    "search_queries": [user_text],
                });
                self.fetch_schema(&fallback).await
            }
        }
    }
}

/// Decode a reply that must be exactly `200` with a JSON body.
pub fn decode_json_reply(endpoint: &str, status: StatusCode, body: &str) -> AppResult<Value> {
    if status != StatusCode::OK {
        return Err(AppError::schema_service(format!(
            "{} HTTP {}: {}",
            endpoint,
            status.as_u16(),
            clip(body)
        )));
    }
    serde_json::from_str(body).map_err(|_| {
        AppError::schema_service(format!("{} returned non-JSON: {}", endpoint, clip(body)))
    })
}

/// Decode an ingest reply. Any 2xx is accepted; a body that is not JSON
/// becomes `{ok, status_code, text}`.
pub fn decode_ingest_reply(status: StatusCode, body: &str) -> AppResult<Value> {
    if !status.is_success() {
        return Err(AppError::schema_service(format!(
            "/rag/history/ingest HTTP {}: {}",
            status.as_u16(),
            clip(body)
        )));
    }
    Ok(serde_json::from_str(body).unwrap_or_else(|_| {
        json!({
            "ok": true,
            "status_code": status.as_u16(),
            "text": clip(body),
        })
    }))
}

/// Validate a `/schema` response and return its `schema` object.
pub fn parse_schema_payload(payload: Value) -> AppResult<Value> {
    if payload.get("ok").and_then(Value::as_bool) != Some(true) {
        let error = payload
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("schema service returned ok=false");
        return Err(AppError::schema_service(error));
    }

    match payload.get("schema") {
        Some(schema) if schema.get("tables").is_some() => Ok(schema.clone()),
        _ => Err(AppError::schema_service(format!(
            "response has no schema: {}",
            clip(&payload.to_string())
        ))),
    }
}

/// Matches from a `/rag/history/search` response; `ok: false` means none.
pub fn parse_search_payload(payload: Value) -> Vec<Value> {
    if payload.get("ok").and_then(Value::as_bool) != Some(true) {
        return Vec::new();
    }
    match payload.get("matches") {
        Some(Value::Array(matches)) => matches.clone(),
        _ => Vec::new(),
    }
}

fn clip(text: &str) -> String {
    text.chars().take(ERROR_BODY_CHARS).collect()
}

// ── Local Introspection ────────────────────────────────────────────────

/// Schema context read directly from the SQLite file being queried.
pub struct SqliteSchemaSource {
    executor: Arc<SqliteExecutor>,
}

impl SqliteSchemaSource {
    pub fn new(executor: Arc<SqliteExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl SchemaSource for SqliteSchemaSource {
    async fn schema_context(&self, _user_text: &str, _analysis: Option<&Value>) -> AppResult<Value> {
        Ok(self.executor.describe_schema().await?)
    }
}
