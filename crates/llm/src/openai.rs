//! OpenAI-Compatible Provider
//!
//! Implementation of the LlmProvider trait for the `/chat/completions` API.
//! Works against OpenAI itself and any gateway speaking the same protocol
//! (vLLM, LiteLLM, Ollama's OpenAI endpoint) via `base_url`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::provider::{missing_api_key_error, parse_http_error, LlmProvider};
use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, ProviderConfig, StopReason,
    UsageStats, DEFAULT_BASE_URL,
};
use crate::http_client::build_http_client;

/// OpenAI-compatible provider
pub struct OpenAIProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Create a new provider with the given configuration
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let client = build_http_client(
            config.proxy.as_ref(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self { config, client })
    }

    /// Get the API base URL (without trailing slash)
    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    fn is_default_endpoint(&self) -> bool {
        self.config.base_url.is_none()
    }

    /// Bearer token, if any. The public endpoint requires one; custom gateways may not.
    fn api_key(&self) -> LlmResult<Option<&str>> {
        match self.config.api_key.as_deref() {
            Some(key) => Ok(Some(key)),
            None if self.is_default_endpoint() => Err(missing_api_key_error("openai")),
            None => Ok(None),
        }
    }

    /// Build the request body for the API
    fn build_request_body(
        &self,
        messages: &[Message],
        system: Option<&str>,
        request_options: &LlmRequestOptions,
    ) -> serde_json::Value {
        let mut openai_messages: Vec<serde_json::Value> = Vec::with_capacity(messages.len() + 1);

        if let Some(sys) = system {
            openai_messages.push(serde_json::json!({
                "role": "system",
                "content": sys
            }));
        }

        for msg in messages {
            openai_messages.push(serde_json::json!({
                "role": msg.role.as_str(),
                "content": msg.content
            }));
        }

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": request_options.max_tokens_override.unwrap_or(self.config.max_tokens),
            "temperature": request_options.temperature_override.unwrap_or(self.config.temperature),
            "stream": false,
            "messages": openai_messages,
        });

        if request_options.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        body
    }

    /// Parse a response from the API
    fn parse_response(&self, response: OpenAIResponse) -> LlmResponse {
        let choice = response.choices.into_iter().next();

        let stop_reason = choice
            .as_ref()
            .and_then(|c| c.finish_reason.as_deref())
            .map(StopReason::from)
            .unwrap_or(StopReason::EndTurn);

        let (content, thinking) = match choice.and_then(|c| c.message) {
            Some(msg) => (msg.content, msg.reasoning_content),
            None => (None, None),
        };

        let usage = response
            .usage
            .map(|u| UsageStats {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                thinking_tokens: u.reasoning_tokens,
            })
            .unwrap_or_default();

        LlmResponse {
            content,
            thinking,
            stop_reason,
            usage,
            model: response.model,
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> LlmResult<reqwest::RequestBuilder> {
        Ok(match self.api_key()? {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let body = self.build_request_body(&messages, system.as_deref(), &request_options);
        let url = format!("{}/chat/completions", self.base_url());

        let request = self
            .authorized(self.client.post(&url))?
            .header("Content-Type", "application/json")
            .json(&body);

        let response = request.send().await.map_err(|e| LlmError::NetworkError {
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let body_text = response.text().await.map_err(|e| LlmError::NetworkError {
            message: e.to_string(),
        })?;

        if status != 200 {
            return Err(parse_http_error(status, &body_text, self.name()));
        }

        debug!(
            model = %self.config.model,
            body_len = body_text.len(),
            "openai: completion received"
        );

        let openai_response: OpenAIResponse =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ParseError {
                message: format!("Failed to parse response: {}", e),
            })?;

        Ok(self.parse_response(openai_response))
    }

    async fn health_check(&self) -> LlmResult<()> {
        let url = format!("{}/models", self.base_url());
        let response = self
            .authorized(self.client.get(&url))?
            .send()
            .await
            .map_err(|e| LlmError::NetworkError {
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        if status == 200 {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(parse_http_error(status, &body, self.name()))
        }
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// OpenAI API response format
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    reasoning_tokens: Option<u32>,
}
