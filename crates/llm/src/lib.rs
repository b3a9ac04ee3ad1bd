//! nlsql LLM
//!
//! Provides the model contract used by the SQL pipeline:
//! - `LlmProvider` - async provider trait
//! - `complete` - single-turn system + user completion returning raw text
//! - `OpenAIProvider` - OpenAI-compatible `/chat/completions` client
//!
//! Also includes the HTTP client factory with proxy support.

pub mod http_client;
pub mod openai;
pub mod provider;
pub mod types;

// Re-export main types
pub use http_client::build_http_client;
pub use openai::OpenAIProvider;
pub use provider::{complete, response_text, LlmProvider};
pub use types::*;
