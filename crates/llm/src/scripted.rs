//! Scripted Provider
//!
//! Deterministic `LlmProvider` that replays a fixed sequence of responses.
//! Used by tests and by local dry runs without network access.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::provider::LlmProvider;
use crate::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, ProviderConfig, ToolCall,
    ToolDefinition,
};

type Responder = Box<dyn Fn(&[Message]) -> LlmResult<LlmResponse> + Send + Sync>;

enum Step {
    Respond(LlmResponse),
    Fail(LlmError),
    Compute(Responder),
}

/// A request observed by the scripted provider.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub system: Option<String>,
    pub tool_names: Vec<String>,
    pub options: LlmRequestOptions,
}

/// Provider that answers from a script, one step per request.
pub struct ScriptedProvider {
    config: ProviderConfig,
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            config: ProviderConfig {
                model: "scripted".to_string(),
                ..ProviderConfig::default()
            },
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn push(self, step: Step) -> Self {
        self.steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
        self
    }

    /// Respond with a final text answer.
    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.push(Step::Respond(LlmResponse::text(text)))
    }

    /// Respond with one tool call.
    pub fn then_tool(self, id: &str, name: &str, arguments: serde_json::Value) -> Self {
        self.then_tools(vec![ToolCall::new(id, name, arguments)])
    }

    /// Respond with several tool calls in one turn.
    pub fn then_tools(self, calls: Vec<ToolCall>) -> Self {
        self.push(Step::Respond(LlmResponse::with_tool_calls(calls)))
    }

    /// Fail the request.
    pub fn then_error(self, error: LlmError) -> Self {
        self.push(Step::Fail(error))
    }

    /// Compute the response from the conversation so far.
    pub fn then_with<F>(self, responder: F) -> Self
    where
        F: Fn(&[Message]) -> LlmResult<LlmResponse> + Send + Sync + 'static,
    {
        self.push(Step::Compute(Box::new(responder)))
    }

    /// Number of requests received.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// All requests received, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Steps not consumed yet.
    pub fn remaining_steps(&self) -> usize {
        self.steps.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let step = self
            .steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        let result = match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Compute(responder)) => responder(&messages),
            None => Err(LlmError::Other {
                message: "script exhausted".to_string(),
            }),
        };

        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                messages,
                system,
                tool_names: tools.into_iter().map(|t| t.name).collect(),
                options: request_options,
            });

        result
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}
