//! Query Service
//!
//! The request-level entry point: session bookkeeping, schema retrieval,
//! the retry loop and history ingest around one question.

use std::sync::Arc;
use std::time::Instant;

use nlsql_core::QueryExecutor;
use nlsql_llm::{LlmProvider, Message};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::schema::{HistoryRecord, HistorySearch, RagSchemaService, SchemaSource};
use super::session_store::SessionStore;
use super::sql_pipeline::{analyze_query, execute_with_retries, QueryOutcome, RetryPolicy};
use crate::models::settings::SchemaServiceSettings;
use crate::utils::error::{AppError, AppResult};

/// History key used for question/answer turns.
pub const MESSAGE_KEY: &str = "sql";

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub question: String,
    pub session_id: Option<String>,
    /// Overrides the service-wide cancellation token for this request.
    pub cancel: Option<CancellationToken>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub session_id: String,
    pub outcome: QueryOutcome,
}

/// RAG history search/ingest settings.
struct HistoryIndex {
    service: RagSchemaService,
    top_k: usize,
    ingest: bool,
}

pub struct QueryService {
    provider: Arc<dyn LlmProvider>,
    executor: Arc<dyn QueryExecutor>,
    schema: Arc<dyn SchemaSource>,
    sessions: Arc<SessionStore>,
    policy: RetryPolicy,
    analyze: bool,
    history: Option<HistoryIndex>,
    db_fingerprint: String,
}

impl QueryService {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        executor: Arc<dyn QueryExecutor>,
        schema: Arc<dyn SchemaSource>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            provider,
            executor,
            schema,
            sessions,
            policy: RetryPolicy::default(),
            analyze: false,
            history: None,
            db_fingerprint: String::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run query analysis before asking the schema source.
    pub fn with_analysis(mut self, analyze: bool) -> Self {
        self.analyze = analyze;
        self
    }

    /// Use the RAG history index for examples and ingest.
    pub fn with_history(mut self, service: RagSchemaService, settings: &SchemaServiceSettings) -> Self {
        self.history = Some(HistoryIndex {
            service,
            top_k: settings.history_top_k,
            ingest: settings.ingest_history,
        });
        self
    }

    /// Identifies the database to the history index.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.db_fingerprint = fingerprint.into();
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Answer one question.
    ///
    /// Schema and analysis failures come back as `ok = false` outcomes; only
    /// session bookkeeping failures are returned as `Err`.
    pub async fn answer(&self, request: QueryRequest) -> AppResult<QueryResponse> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(AppError::validation("question must not be empty"));
        }

        let session_id = self.sessions.append_messages(
            request.session_id.as_deref(),
            MESSAGE_KEY,
            vec![Message::user(question)],
        )?;
        info!(session_id = %session_id, "answering question");

        let started = Instant::now();
        let outcome = match self.schema_context(question).await {
            Ok(schema_context) => {
                let mut policy = self.policy.clone();
                if request.cancel.is_some() {
                    policy.cancel = request.cancel.clone();
                }
                let outcome = execute_with_retries(
                    self.provider.as_ref(),
                    self.executor.as_ref(),
                    question,
                    &schema_context,
                    &policy,
                )
                .await;
                if outcome.ok {
                    self.ingest(question, &outcome, &schema_context, started).await;
                }
                outcome
            }
            Err(e) => {
                warn!(error = %e, "schema context unavailable");
                QueryOutcome::failure(e.to_string(), Vec::new())
            }
        };

        self.record_outcome(&session_id, &outcome)?;

        Ok(QueryResponse {
            session_id,
            outcome,
        })
    }

    async fn schema_context(&self, question: &str) -> AppResult<Value> {
        let analysis = if self.analyze {
            Some(analyze_query(self.provider.as_ref(), question).await?)
        } else {
            None
        };
        let mut context = self.schema.schema_context(question, analysis.as_ref()).await?;

        if let Some(history) = self.history.as_ref().filter(|h| h.top_k > 0) {
            let search = HistorySearch {
                db_fingerprint: self.db_fingerprint.clone(),
                user_query: question.to_string(),
                tables_filter: table_names(&context),
                top_k: history.top_k,
            };
            match history.service.search_history(&search).await {
                Ok(matches) if !matches.is_empty() => {
                    if let Some(object) = context.as_object_mut() {
                        object.insert("history_examples".to_string(), Value::Array(matches));
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "history search failed"),
            }
        }

        Ok(context)
    }

    async fn ingest(&self, question: &str, outcome: &QueryOutcome, context: &Value, started: Instant) {
        let Some(history) = self.history.as_ref().filter(|h| h.ingest) else {
            return;
        };
        let Some(sql) = outcome.sql.as_deref() else {
            return;
        };

        let record = HistoryRecord {
            db_fingerprint: self.db_fingerprint.clone(),
            user_query: question.to_string(),
            sql: sql.to_string(),
            tables_used: tables_referenced(sql, context),
            duration_ms: Some(started.elapsed().as_millis() as u64),
            rows_count: outcome.rows_preview.as_ref().map(Vec::len),
        };
        if let Err(e) = history.service.ingest_history(&record).await {
            warn!(error = %e, "history ingest failed");
        }
    }

    fn record_outcome(&self, session_id: &str, outcome: &QueryOutcome) -> AppResult<()> {
        if let Some(sql) = &outcome.sql {
            self.sessions.set_state(session_id, "last_sql", json!(sql))?;
        }
        self.sessions
            .set_state(session_id, "last_outcome", serde_json::to_value(outcome)?)?;
        self.sessions.append_messages(
            Some(session_id),
            MESSAGE_KEY,
            vec![Message::assistant(assistant_summary(outcome))],
        )?;
        Ok(())
    }
}

/// One-message summary of an outcome for the conversation history.
pub fn assistant_summary(outcome: &QueryOutcome) -> String {
    match (&outcome.sql, &outcome.error) {
        (Some(sql), _) if outcome.ok => {
            let rows = outcome.rows_preview.as_ref().map(Vec::len).unwrap_or(0);
            format!("Returned {} row(s).\n\n{}", rows, sql)
        }
        (_, Some(error)) => format!("Failed: {}", error),
        _ => "Failed.".to_string(),
    }
}

/// Table names present in a schema context.
pub fn table_names(context: &Value) -> Vec<String> {
    match context.get("tables") {
        Some(Value::Object(tables)) => tables.keys().cloned().collect(),
        Some(Value::Array(tables)) => tables
            .iter()
            .filter_map(|t| t.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Schema tables whose name appears in `sql`.
pub fn tables_referenced(sql: &str, context: &Value) -> Vec<String> {
    let lowered = sql.to_lowercase();
    table_names(context)
        .into_iter()
        .filter(|name| {
            let name = name.to_lowercase();
            let bare = name.rsplit('.').next().unwrap_or(&name);
            lowered
                .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                .any(|word| word == bare)
        })
        .collect()
}
