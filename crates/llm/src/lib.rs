//! Analytics Agent LLM
//!
//! Reasoning-model access for the orchestrator:
//! - `provider` - the `LlmProvider` trait and HTTP error mapping
//! - `openai` - OpenAI-compatible chat-completions provider (OpenRouter, OpenAI)
//! - `retry` - bounded exponential-backoff retry for transient failures
//! - `scripted` - deterministic provider for tests and offline runs
//! - `http_client` - reqwest client factory

pub mod http_client;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod scripted;
pub mod types;

// Re-export main types
pub use http_client::build_http_client;
pub use openai::OpenAICompatibleProvider;
pub use provider::LlmProvider;
pub use retry::{send_with_retry, RetryPolicy};
pub use scripted::{RecordedRequest, ScriptedProvider};
pub use types::*;
