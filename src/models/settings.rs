//! Settings Models
//!
//! Application configuration and settings data structures.

use std::path::PathBuf;

use nlsql_llm::ProviderConfig;
use serde::{Deserialize, Serialize};

/// Environment variables consulted, in order, when the config has no API key.
pub const API_KEY_ENV_VARS: [&str; 2] = ["NLSQL_API_KEY", "OPENAI_API_KEY"];

pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application configuration stored in config.json
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Model provider settings
    #[serde(default)]
    pub provider: ProviderConfig,
    /// SQLite database queried by `ask` and `schema`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// Retry loop budgets
    #[serde(default)]
    pub retry: RetrySettings,
    /// Optional RAG schema/history service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_service: Option<SchemaServiceSettings>,
    /// Default tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            database_path: None,
            retry: RetrySettings::default(),
            schema_service: None,
            log_level: default_log_level(),
        }
    }
}

/// Budgets for the generate/execute/repair loop
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub preview_limit: usize,
    pub max_timeouts: u32,
    pub statement_timeout_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            preview_limit: 10,
            max_timeouts: 2,
            statement_timeout_ms: 15_000,
        }
    }
}

/// RAG schema/history service endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaServiceSettings {
    pub base_url: String,
    #[serde(default = "default_service_timeout_secs")]
    pub timeout_secs: u64,
    /// Prior queries attached to the schema context; 0 disables the search
    #[serde(default = "default_history_top_k")]
    pub history_top_k: usize,
    /// Ingest successful queries into the history index
    #[serde(default = "default_true")]
    pub ingest_history: bool,
}

fn default_service_timeout_secs() -> u64 {
    30
}

fn default_history_top_k() -> usize {
    3
}

fn default_true() -> bool {
    true
}

impl SchemaServiceSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: default_service_timeout_secs(),
            history_top_k: default_history_top_k(),
            ingest_history: true,
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub database_path: Option<PathBuf>,
    pub max_attempts: Option<u32>,
    pub preview_limit: Option<usize>,
    pub max_timeouts: Option<u32>,
    pub statement_timeout_ms: Option<u64>,
    pub schema_service_url: Option<String>,
    pub log_level: Option<String>,
}

impl AppConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(model) = update.model {
            self.provider.model = model;
        }
        if let Some(base_url) = update.base_url {
            self.provider.base_url = Some(base_url);
        }
        if let Some(path) = update.database_path {
            self.database_path = Some(path);
        }
        if let Some(max_attempts) = update.max_attempts {
            self.retry.max_attempts = max_attempts;
        }
        if let Some(preview_limit) = update.preview_limit {
            self.retry.preview_limit = preview_limit;
        }
        if let Some(max_timeouts) = update.max_timeouts {
            self.retry.max_timeouts = max_timeouts;
        }
        if let Some(ms) = update.statement_timeout_ms {
            self.retry.statement_timeout_ms = ms;
        }
        if let Some(url) = update.schema_service_url {
            match self.schema_service.as_mut() {
                Some(service) => service.base_url = url,
                None => self.schema_service = Some(SchemaServiceSettings::new(url)),
            }
        }
        if let Some(level) = update.log_level {
            self.log_level = level;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.retry.max_attempts < 1 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.max_timeouts < 1 {
            return Err("retry.max_timeouts must be at least 1".to_string());
        }
        if !(1..=1000).contains(&self.retry.preview_limit) {
            return Err(format!(
                "retry.preview_limit must be between 1 and 1000, got {}",
                self.retry.preview_limit
            ));
        }
        if self.retry.statement_timeout_ms < 100 {
            return Err("retry.statement_timeout_ms must be at least 100".to_string());
        }
        if self.provider.model.trim().is_empty() {
            return Err("provider.model must not be empty".to_string());
        }
        if let Some(service) = &self.schema_service {
            if service.base_url.trim().is_empty() {
                return Err("schema_service.base_url must not be empty".to_string());
            }
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level: {}. Must be one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            ));
        }
        Ok(())
    }

    /// Provider settings with the API key filled from the environment when absent.
    pub fn resolved_provider(&self) -> ProviderConfig {
        self.resolved_provider_with(|name| std::env::var(name).ok())
    }

    fn resolved_provider_with(&self, lookup: impl Fn(&str) -> Option<String>) -> ProviderConfig {
        let mut provider = self.provider.clone();
        if provider.api_key.is_none() {
            provider.api_key = API_KEY_ENV_VARS
                .iter()
                .filter_map(|name| lookup(name))
                .find(|key| !key.trim().is_empty());
        }
        provider
    }
}
