//! LLM Provider Trait
//!
//! Defines the common interface for reasoning-model providers.

use async_trait::async_trait;

use super::types::{LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, ProviderConfig, ToolDefinition};

/// Trait that all LLM providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Returns the current model being used.
    fn model(&self) -> &str;

    /// Send a message and get a complete response.
    ///
    /// # Arguments
    /// * `messages` - Conversation history
    /// * `system` - Optional system prompt
    /// * `tools` - Available tools for the model to use
    /// * `request_options` - Per-request tool mode and temperature
    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse>;

    /// Check if the provider is configured and reachable.
    async fn health_check(&self) -> LlmResult<()> {
        Ok(())
    }

    /// Get the configuration for this provider.
    fn config(&self) -> &ProviderConfig;
}

/// Helper function to create an error for missing API key
pub fn missing_api_key_error(provider: &str) -> LlmError {
    LlmError::AuthenticationFailed {
        message: format!("API key not configured for {}", provider),
    }
}

/// Helper function to parse HTTP error status codes
pub fn parse_http_error(status: u16, body: &str, provider: &str, retry_after: Option<u32>) -> LlmError {
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
        408 => LlmError::NetworkError {
            message: format!("{}: request timeout", provider),
        },
        429 => LlmError::RateLimited {
            message: body.to_string(),
            retry_after,
        },
        400 if body.contains("context_length") || body.contains("maximum context length") => {
            LlmError::ContextLengthExceeded {
                message: body.to_string(),
            }
        }
        400 | 422 => LlmError::InvalidRequest {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_error() {
        let err = missing_api_key_error("openrouter");
        match err {
            LlmError::AuthenticationFailed { message } => {
                assert!(message.contains("openrouter"));
            }
            _ => panic!("Expected AuthenticationFailed"),
        }
    }

    #[test]
    fn test_parse_http_error() {
        let err = parse_http_error(401, "unauthorized", "openrouter", None);
        assert!(matches!(err, LlmError::AuthenticationFailed { .. }));

        let err = parse_http_error(429, "rate limited", "openrouter", Some(7));
        assert_eq!(err.retry_after(), Some(7));

        let err = parse_http_error(502, "bad gateway", "openrouter", None);
        assert!(matches!(err, LlmError::ServerError { status: Some(502), .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_parse_context_length_error() {
        let err = parse_http_error(
            400,
            r#"{"error":{"code":"context_length_exceeded"}}"#,
            "openai",
            None,
        );
        assert!(matches!(err, LlmError::ContextLengthExceeded { .. }));
        assert!(!err.is_transient());
    }
}
