//! Shared HTTP client construction policy for adapters.
//!
//! Adapters get one client each, built here so timeout, user-agent and
//! compression stay consistent.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::HeaderMap;

use crate::user_agent;

use super::AdapterError;

/// Connect timeout ceiling; the overall request timeout comes from config.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Builds an adapter HTTP client with the configured request timeout and
/// extra default headers.
///
/// # Errors
///
/// Returns [`AdapterError::Config`] when client construction fails (for
/// example, TLS backend initialisation).
pub fn build_adapter_http_client(
    adapter: &str,
    timeout: Duration,
    headers: HeaderMap,
) -> Result<Client, AdapterError> {
    Client::builder()
        .connect_timeout(timeout.min(Duration::from_secs(CONNECT_TIMEOUT_SECS)))
        .timeout(timeout)
        .user_agent(user_agent::default_fetch_user_agent())
        .default_headers(headers)
        .gzip(true)
        .build()
        .map_err(|e| AdapterError::Config {
            adapter: adapter.to_string(),
            reason: format!("HTTP client construction failed: {e}"),
            suggestion: "Check the `headers` and `timeout` values".to_string(),
        })
}
