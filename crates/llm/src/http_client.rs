//! HTTP Client Factory
//!
//! Builds the `reqwest` client shared by a provider instance.

use std::time::Duration;

use crate::types::{LlmError, LlmResult};

/// Build a `reqwest::Client` with a whole-request timeout.
///
/// Proxy settings come from the standard environment variables.
pub fn build_http_client(request_timeout: Duration) -> LlmResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| LlmError::Other {
            message: format!("failed to build HTTP client: {}", e),
        })
}
