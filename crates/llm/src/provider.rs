//! LLM Provider Trait
//!
//! Defines the common interface for all LLM providers.

use async_trait::async_trait;
use tracing::debug;

use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, ProviderConfig,
};

/// Trait that all LLM providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Returns the current model being used.
    fn model(&self) -> &str;

    /// Send a conversation and get a complete response.
    ///
    /// # Arguments
    /// * `messages` - Conversation history
    /// * `system` - Optional system prompt
    /// * `request_options` - Per-request overrides
    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse>;

    /// Check if the provider is healthy and reachable.
    async fn health_check(&self) -> LlmResult<()>;

    /// Get the configuration for this provider.
    fn config(&self) -> &ProviderConfig;
}

/// Extract the text of a response.
///
/// Reasoning models sometimes leave `content` empty and put the answer in the
/// thinking field, so that is used as a fallback.
pub fn response_text(response: &LlmResponse) -> LlmResult<String> {
    if let Some(text) = response.content.as_deref() {
        if !text.trim().is_empty() {
            return Ok(text.to_string());
        }
    }
    if let Some(thinking) = response.thinking.as_deref() {
        if !thinking.trim().is_empty() {
            debug!(
                thinking_len = thinking.len(),
                "content field empty, falling back to thinking field"
            );
            return Ok(thinking.to_string());
        }
    }
    Err(LlmError::ParseError {
        message: format!(
            "response contained no text content (model: {}, stop_reason: {:?})",
            response.model, response.stop_reason
        ),
    })
}

/// Single-turn completion: one system instruction, one user message, raw text back.
pub async fn complete(
    provider: &dyn LlmProvider,
    system_instruction: &str,
    user_message: &str,
) -> LlmResult<String> {
    let response = provider
        .send_message(
            vec![Message::user(user_message)],
            Some(system_instruction.to_string()),
            LlmRequestOptions::json(),
        )
        .await?;
    response_text(&response)
}

/// Helper function to create an error for missing API key
pub fn missing_api_key_error(provider: &str) -> LlmError {
    LlmError::AuthenticationFailed {
        message: format!("API key not configured for {}", provider),
    }
}

/// Helper function to parse HTTP error status codes
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> LlmError {
    match status {
        401 => LlmError::AuthenticationFailed {
            message: format!("{}: Invalid API key", provider),
        },
        403 => LlmError::AuthenticationFailed {
            message: format!("{}: Access denied", provider),
        },
        404 => LlmError::ModelNotFound {
            model: body.to_string(),
        },
        429 => LlmError::RateLimited {
            message: body.to_string(),
            retry_after: None,
        },
        400 => LlmError::InvalidRequest {
            message: body.to_string(),
        },
        500..=599 => LlmError::ServerError {
            message: body.to_string(),
            status: Some(status),
        },
        _ => LlmError::Other {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}
