//! Session Store
//!
//! In-memory conversation history keyed by `(session_id, message_key)`, plus
//! a small per-session JSON state map. Created once at startup and shared by
//! `Arc`; every request reads and writes through the same instance.

use std::collections::HashMap;
use std::sync::RwLock;

use nlsql_llm::Message;
use serde_json::Value;
use uuid::Uuid;

use crate::utils::error::{AppError, AppResult};

/// Messages kept per history key; older ones are dropped.
pub const HISTORY_WINDOW: usize = 80;

type HistoryKey = (String, String);

#[derive(Default)]
struct Inner {
    histories: HashMap<HistoryKey, Vec<Message>>,
    /// History keys, least recently written first.
    order: Vec<HistoryKey>,
    state: HashMap<String, HashMap<String, Value>>,
}

impl Inner {
    fn touch(&mut self, key: &HistoryKey) {
        self.order.retain(|k| k != key);
        self.order.push(key.clone());
    }
}

/// Shared conversation/session store.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<Inner>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AppResult<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| AppError::session("store lock poisoned"))
    }

    fn write(&self) -> AppResult<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| AppError::session("store lock poisoned"))
    }

    /// Append messages to a history and return the session id.
    ///
    /// A missing `session_id` starts a new session. The written key becomes
    /// the most recent one.
    pub fn append_messages(
        &self,
        session_id: Option<&str>,
        message_key: &str,
        messages: Vec<Message>,
    ) -> AppResult<String> {
        let session_id = match session_id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => Uuid::new_v4().simple().to_string(),
        };
        let key = (session_id.clone(), message_key.to_string());

        let mut inner = self.write()?;
        let history = inner.histories.entry(key.clone()).or_default();
        history.extend(messages);
        if history.len() > HISTORY_WINDOW {
            let excess = history.len() - HISTORY_WINDOW;
            history.drain(..excess);
        }
        inner.touch(&key);

        Ok(session_id)
    }

    /// Copy of a history. A missing `session_id` reads the most recently
    /// written key, ignoring `message_key`.
    pub fn get_history(&self, session_id: Option<&str>, message_key: &str) -> AppResult<Vec<Message>> {
        let inner = self.read()?;
        let key = match session_id {
            Some(id) => (id.to_string(), message_key.to_string()),
            None => match inner.order.last() {
                Some(last) => last.clone(),
                None => return Ok(Vec::new()),
            },
        };
        Ok(inner.histories.get(&key).cloned().unwrap_or_default())
    }

    /// The most recently written `(session_id, message_key)`.
    pub fn last_key(&self) -> AppResult<Option<(String, String)>> {
        Ok(self.read()?.order.last().cloned())
    }

    pub fn get_state(&self, session_id: &str, key: &str) -> AppResult<Option<Value>> {
        let inner = self.read()?;
        Ok(inner
            .state
            .get(session_id)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    pub fn set_state(&self, session_id: &str, key: &str, value: Value) -> AppResult<()> {
        let mut inner = self.write()?;
        inner
            .state
            .entry(session_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    /// Number of distinct history keys.
    pub fn len(&self) -> AppResult<usize> {
        Ok(self.read()?.histories.len())
    }

    pub fn is_empty(&self) -> AppResult<bool> {
        Ok(self.len()? == 0)
    }
}
