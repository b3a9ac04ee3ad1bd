//! HTTP Client Factory
//!
//! Provides a factory function for building reqwest clients with proxy support.

use std::time::Duration;

use crate::types::{LlmError, LlmResult, ProxyConfig};

/// Build a `reqwest::Client` with the given proxy and request timeout.
///
/// - `Some(proxy)` -> configure proxy on the client
/// - `None` -> explicitly disable proxy (`no_proxy`), ignoring env vars
pub fn build_http_client(
    proxy: Option<&ProxyConfig>,
    request_timeout: Duration,
) -> LlmResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(request_timeout);
    match proxy {
        Some(cfg) => {
            let mut p = reqwest::Proxy::all(cfg.url()).map_err(|e| LlmError::InvalidRequest {
                message: format!("invalid proxy {}: {}", cfg.url(), e),
            })?;
            if let (Some(u), Some(pw)) = (&cfg.username, &cfg.password) {
                p = p.basic_auth(u, pw);
            }
            builder = builder.proxy(p);
        }
        None => {
            builder = builder.no_proxy();
        }
    }
    builder.build().map_err(|e| LlmError::Other {
        message: format!("failed to build HTTP client: {}", e),
    })
}
