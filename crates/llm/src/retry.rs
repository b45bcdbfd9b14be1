//! Bounded Retry
//!
//! Retries transient provider failures (rate limits, 5xx, network errors)
//! with exponential backoff. Permanent failures return immediately.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;

use crate::provider::LlmProvider;
use crate::types::{LlmRequestOptions, LlmResponse, LlmResult, Message, ToolDefinition};

/// Retry policy for reasoning requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Upper bound on time spent retrying.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
            max_elapsed: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Send a request, retrying transient failures per `policy`.
pub async fn send_with_retry(
    provider: &dyn LlmProvider,
    messages: &[Message],
    system: Option<&str>,
    tools: &[ToolDefinition],
    options: &LlmRequestOptions,
    policy: &RetryPolicy,
) -> LlmResult<LlmResponse> {
    let schedule = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_interval)
        .with_max_interval(policy.max_interval)
        .with_max_elapsed_time(Some(policy.max_elapsed))
        .build();

    let attempts = AtomicU32::new(0);
    let attempts = &attempts;
    let max_attempts = policy.max_attempts.max(1);

    let operation = move || {
        let messages = messages.to_vec();
        let system = system.map(str::to_string);
        let tools = tools.to_vec();
        let options = options.clone();
        async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match provider.send_message(messages, system, tools, options).await {
                Ok(response) => Ok(response),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    match err.retry_after() {
                        Some(secs) => Err(backoff::Error::retry_after(
                            err,
                            Duration::from_secs(u64::from(secs)),
                        )),
                        None => Err(backoff::Error::transient(err)),
                    }
                }
                Err(err) => Err(backoff::Error::permanent(err)),
            }
        }
    };

    backoff::future::retry_notify(schedule, operation, |err, wait: Duration| {
        tracing::warn!(
            provider = provider.name(),
            wait_ms = wait.as_millis() as u64,
            "reasoning request failed, retrying: {}",
            err
        );
    })
    .await
}
