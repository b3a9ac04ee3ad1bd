//! Query Service Integration Tests
//!
//! Session bookkeeping, analysis hand-off and schema failures around the
//! retry loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nlsql::services::query_service::MESSAGE_KEY;
use nlsql::services::{QueryRequest, QueryService, SchemaSource, SessionStore, SqliteSchemaSource};
use nlsql::{AppError, AppResult};
use nlsql_executor::SqliteExecutor;
use nlsql_llm::MessageRole;
use serde_json::{json, Value};

use crate::common::{gen_reply, rows, schema, seeded_db, ScriptedExecutor, ScriptedProvider};

/// Schema source that records the analysis it was given.
#[derive(Default)]
struct RecordingSchema {
    seen: Mutex<Vec<Option<Value>>>,
    fail: bool,
}

#[async_trait]
impl SchemaSource for RecordingSchema {
    async fn schema_context(&self, _user_text: &str, analysis: Option<&Value>) -> AppResult<Value> {
        self.seen.lock().unwrap().push(analysis.cloned());
        if self.fail {
            return Err(AppError::schema_service("index not built"));
        }
        Ok(schema())
    }
}

fn service(
    provider: ScriptedProvider,
    executor: ScriptedExecutor,
    schema: Arc<RecordingSchema>,
) -> QueryService {
    QueryService::new(
        Arc::new(provider),
        Arc::new(executor),
        schema,
        Arc::new(SessionStore::new()),
    )
}

#[tokio::test]
async fn test_answer_records_history_and_state() {
    let svc = service(
        ScriptedProvider::new([gen_reply("SELECT id FROM flights")]),
        ScriptedExecutor::new([Ok(rows(2))]),
        Arc::new(RecordingSchema::default()),
    );

    let response = svc.answer(QueryRequest::new("  list flights  ")).await.unwrap();
    assert!(response.outcome.ok);
    assert_eq!(response.session_id.len(), 32);

    let sessions = svc.sessions();
    let history = sessions
        .get_history(Some(&response.session_id), MESSAGE_KEY)
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, MessageRole::User);
    assert_eq!(history[0].content, "list flights");
    assert_eq!(history[1].role, MessageRole::Assistant);
    assert_eq!(history[1].content, "Returned 2 row(s).\n\nSELECT id FROM flights");

    let last_sql = sessions.get_state(&response.session_id, "last_sql").unwrap();
    assert_eq!(last_sql, Some(json!("SELECT id FROM flights")));
    let last_outcome = sessions
        .get_state(&response.session_id, "last_outcome")
        .unwrap()
        .unwrap();
    assert_eq!(last_outcome["ok"], json!(true));
}

#[tokio::test]
async fn test_session_is_reused() {
    let svc = service(
        ScriptedProvider::new([gen_reply("SELECT id FROM flights")]),
        ScriptedExecutor::new([Ok(rows(1))]),
        Arc::new(RecordingSchema::default()),
    );

    let first = svc.answer(QueryRequest::new("one")).await.unwrap();
    let second = svc
        .answer(QueryRequest::new("two").with_session(first.session_id.clone()))
        .await
        .unwrap();

    assert_eq!(first.session_id, second.session_id);
    let history = svc
        .sessions()
        .get_history(Some(&first.session_id), MESSAGE_KEY)
        .unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(svc.sessions().len().unwrap(), 1);
}

#[tokio::test]
async fn test_empty_question_is_rejected() {
    let svc = service(
        ScriptedProvider::new([gen_reply("SELECT 1")]),
        ScriptedExecutor::new([Ok(rows(1))]),
        Arc::new(RecordingSchema::default()),
    );

    let err = svc.answer(QueryRequest::new("   ")).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(svc.sessions().is_empty().unwrap());
}

#[tokio::test]
async fn test_analysis_is_passed_to_schema_source() {
    let schema_source = Arc::new(RecordingSchema::default());
    let provider = ScriptedProvider::new([
        json!({"intent": "list", "search_queries": ["flights price"]}).to_string(),
        gen_reply("SELECT id FROM flights"),
    ]);
    let svc = service(provider, ScriptedExecutor::new([Ok(rows(1))]), schema_source.clone())
        .with_analysis(true);

    let response = svc.answer(QueryRequest::new("cheap flights")).await.unwrap();
    assert!(response.outcome.ok);

    let seen = schema_source.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let analysis = seen[0].as_ref().unwrap();
    assert_eq!(analysis["intent"], json!("list"));
}

#[tokio::test]
async fn test_schema_failure_becomes_failed_outcome() {
    let schema_source = Arc::new(RecordingSchema {
        fail: true,
        ..Default::default()
    });
    let executor = ScriptedExecutor::new([Ok(rows(1))]);
    let svc = service(
        ScriptedProvider::new([gen_reply("SELECT 1")]),
        executor,
        schema_source,
    );

    let response = svc.answer(QueryRequest::new("anything")).await.unwrap();

    assert!(!response.outcome.ok);
    assert_eq!(
        response.outcome.error.as_deref(),
        Some("Schema service error: index not built")
    );
    assert!(response.outcome.attempts.is_empty());

    let history = svc
        .sessions()
        .get_history(Some(&response.session_id), MESSAGE_KEY)
        .unwrap();
    assert_eq!(history[1].content, "Failed: Schema service error: index not built");
    assert!(svc
        .sessions()
        .get_state(&response.session_id, "last_sql")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_local_schema_source_against_sqlite() {
    let (_dir, path) = seeded_db();
    let executor = Arc::new(SqliteExecutor::open(&path, Duration::from_secs(5)).unwrap());
    let provider = Arc::new(ScriptedProvider::new([gen_reply(
        "SELECT city FROM airports ORDER BY city",
    )]));

    let svc = QueryService::new(
        provider.clone(),
        executor.clone(),
        Arc::new(SqliteSchemaSource::new(executor)),
        Arc::new(SessionStore::new()),
    );

    let response = svc.answer(QueryRequest::new("which cities")).await.unwrap();
    assert!(response.outcome.ok);
    let rows = response.outcome.rows_preview.unwrap();
    assert_eq!(rows[0]["city"], json!("New York"));

    let prompt = &provider.calls()[0].user;
    assert!(prompt.contains("\"airports\""));
    assert!(prompt.contains("\"foreign_keys\""));
}
