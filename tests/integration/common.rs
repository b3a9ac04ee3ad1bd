//! Shared test doubles: a scripted model provider and a scripted executor.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use nlsql_core::{ExecError, QueryExecutor, Row};
use nlsql_llm::{
    LlmError, LlmProvider, LlmRequestOptions, LlmResponse, LlmResult, Message, ProviderConfig,
};
use serde_json::{json, Value};

/// One recorded model call.
#[derive(Debug, Clone)]
pub struct Call {
    pub system: String,
    pub user: String,
    pub json_mode: bool,
}

/// Replies are consumed in order; the last one repeats once the script runs out.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<LlmResult<String>>>,
    last: Mutex<Option<LlmResult<String>>>,
    calls: Mutex<Vec<Call>>,
    config: ProviderConfig,
}

impl ScriptedProvider {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(replies.into_iter().map(|r| Ok(r.into())))
    }

    pub fn with_results(replies: impl IntoIterator<Item = LlmResult<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            config: ProviderConfig::default(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        self.calls.lock().unwrap().push(Call {
            system: system.unwrap_or_default(),
            user: messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
            json_mode: request_options.json_mode,
        });

        let next = self.replies.lock().unwrap().pop_front();
        let reply = match next {
            Some(reply) => {
                *self.last.lock().unwrap() = Some(reply.clone());
                reply
            }
            None => self.last.lock().unwrap().clone().unwrap_or_else(|| {
                Err(LlmError::Other {
                    message: "script exhausted".to_string(),
                })
            }),
        };
        reply.map(|text| LlmResponse::text(text, "scripted-model"))
    }

    async fn health_check(&self) -> LlmResult<()> {
        Ok(())
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Results are consumed in order; the last one repeats.
pub struct ScriptedExecutor {
    results: Mutex<VecDeque<Result<Vec<Row>, ExecError>>>,
    last: Mutex<Option<Result<Vec<Row>, ExecError>>>,
    ran: Mutex<Vec<(String, usize)>>,
}

impl ScriptedExecutor {
    pub fn new(results: impl IntoIterator<Item = Result<Vec<Row>, ExecError>>) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
            last: Mutex::new(None),
            ran: Mutex::new(Vec::new()),
        }
    }

    /// Statements executed so far, with the row limit passed.
    pub fn ran(&self) -> Vec<(String, usize)> {
        self.ran.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn run(&self, sql: &str, limit: usize) -> Result<Vec<Row>, ExecError> {
        self.ran.lock().unwrap().push((sql.to_string(), limit));
        let next = self.results.lock().unwrap().pop_front();
        match next {
            Some(result) => {
                *self.last.lock().unwrap() = Some(result.clone());
                result
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(Vec::new())),
        }
    }
}

/// Executor that never finishes.
pub struct HangingExecutor;

#[async_trait]
impl QueryExecutor for HangingExecutor {
    async fn run(&self, _sql: &str, _limit: usize) -> Result<Vec<Row>, ExecError> {
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
}

pub fn rows(n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| {
            let mut row = Row::new();
            row.insert("id".to_string(), json!(i));
            row
        })
        .collect()
}

pub fn gen_reply(sql: &str) -> String {
    json!({ "sql": sql, "explanation": "test" }).to_string()
}

pub fn fix_reply(sql: &str, notes: &str) -> String {
    json!({ "sql": sql, "fix_notes": notes }).to_string()
}

pub fn schema() -> Value {
    json!({
        "tables": {
            "flights": {"columns": [{"name": "id"}, {"name": "origin"}, {"name": "price"}]}
        },
        "foreign_keys": []
    })
}

/// A small flights database in a temp dir.
pub fn seeded_db() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flights.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE airports (code TEXT PRIMARY KEY, city TEXT NOT NULL);
         CREATE TABLE flights (
             id INTEGER PRIMARY KEY,
             origin TEXT NOT NULL REFERENCES airports(code),
             dest TEXT NOT NULL REFERENCES airports(code),
             price REAL
         );
         INSERT INTO airports VALUES ('SFO', 'San Francisco'), ('JFK', 'New York');
         INSERT INTO flights (origin, dest, price) VALUES
             ('SFO', 'JFK', 199.5),
             ('JFK', 'SFO', 120.0),
             ('SFO', 'JFK', 250.0);",
    )
    .unwrap();
    (dir, path)
}
