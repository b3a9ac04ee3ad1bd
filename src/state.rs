//! Application State
//!
//! Process-wide state: the configuration service and the session store.
//! Query services are assembled from it per invocation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nlsql_executor::SqliteExecutor;
use nlsql_llm::OpenAIProvider;
use tokio::sync::RwLock;
use tracing::info;

use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::services::query_service::QueryService;
use crate::services::schema::{RagSchemaService, SqliteSchemaSource};
use crate::services::session_store::SessionStore;
use crate::services::sql_pipeline::RetryPolicy;
use crate::storage::ConfigService;
use crate::utils::error::{AppError, AppResult};

/// Per-invocation overrides of configured values.
#[derive(Debug, Clone, Default)]
pub struct QueryOverrides {
    pub database: Option<PathBuf>,
    pub max_attempts: Option<u32>,
}

/// Application state shared by all requests
pub struct AppState {
    /// Configuration service for app settings
    config: Arc<RwLock<Option<ConfigService>>>,
    /// Conversation history and per-session state
    sessions: Arc<SessionStore>,
    /// Whether the state has been initialized
    initialized: Arc<RwLock<bool>>,
}

impl AppState {
    /// Create a new uninitialized app state
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(None)),
            sessions: Arc::new(SessionStore::new()),
            initialized: Arc::new(RwLock::new(false)),
        }
    }

    /// Initialize from the config file in the application directory
    pub async fn initialize(&self) -> AppResult<()> {
        if *self.initialized.read().await {
            return Ok(());
        }
        self.initialize_with(ConfigService::new()?).await
    }

    /// Initialize with an already opened config service
    pub async fn initialize_with(&self, config: ConfigService) -> AppResult<()> {
        let mut initialized = self.initialized.write().await;
        if *initialized {
            return Ok(());
        }

        {
            let mut config_lock = self.config.write().await;
            *config_lock = Some(config);
        }

        *initialized = true;
        Ok(())
    }

    pub fn sessions(&self) -> Arc<SessionStore> {
        Arc::clone(&self.sessions)
    }

    /// Get the current configuration
    pub async fn get_config(&self) -> AppResult<AppConfig> {
        let guard = self.config.read().await;
        match &*guard {
            Some(config) => Ok(config.get_config().clone()),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Update the configuration
    pub async fn update_config(&self, update: SettingsUpdate) -> AppResult<AppConfig> {
        let mut guard = self.config.write().await;
        match &mut *guard {
            Some(config) => config.update_config(update),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Reset the configuration to defaults
    pub async fn reset_config(&self) -> AppResult<AppConfig> {
        let mut guard = self.config.write().await;
        match &mut *guard {
            Some(config) => {
                config.reset()?;
                Ok(config.get_config().clone())
            }
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Open the configured (or overridden) database read-only
    pub async fn open_executor(&self, database: Option<PathBuf>) -> AppResult<Arc<SqliteExecutor>> {
        let config = self.get_config().await?;
        let path = database.or(config.database_path).ok_or_else(|| {
            AppError::config("No database configured; pass --database or set database_path")
        })?;
        let executor = SqliteExecutor::open(
            &path,
            Duration::from_millis(config.retry.statement_timeout_ms),
        )?;
        Ok(Arc::new(executor))
    }

    /// Build the configured model provider
    pub async fn provider(&self) -> AppResult<Arc<OpenAIProvider>> {
        let config = self.get_config().await?;
        Ok(Arc::new(OpenAIProvider::new(config.resolved_provider())?))
    }

    /// Assemble a query service from the current configuration
    pub async fn query_service(&self, overrides: QueryOverrides) -> AppResult<QueryService> {
        let config = self.get_config().await?;
        let executor = self.open_executor(overrides.database).await?;
        let provider = self.provider().await?;

        let mut policy = RetryPolicy::from(&config.retry);
        if let Some(max_attempts) = overrides.max_attempts {
            if max_attempts < 1 {
                return Err(AppError::validation("max_attempts must be at least 1"));
            }
            policy.max_attempts = max_attempts;
        }

        let fingerprint = executor.path().display().to_string();
        let service = match &config.schema_service {
            Some(settings) => {
                info!(base_url = %settings.base_url, "using RAG schema service");
                let rag = RagSchemaService::new(settings)?;
                QueryService::new(provider, executor, Arc::new(rag.clone()), self.sessions())
                    .with_analysis(true)
                    .with_history(rag, settings)
            }
            None => {
                let schema = Arc::new(SqliteSchemaSource::new(Arc::clone(&executor)));
                QueryService::new(provider, executor, schema, self.sessions())
            }
        };

        Ok(service.with_policy(policy).with_fingerprint(fingerprint))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
