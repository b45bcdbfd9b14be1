//! OpenAI-Compatible Provider
//!
//! Chat-completions client for OpenRouter and OpenAI. Both share the same
//! wire format for messages, tool definitions and tool calls; OpenRouter
//! additionally accepts attribution headers.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::provider::{missing_api_key_error, parse_http_error, LlmProvider};
use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, MessageContent, MessageRole,
    ProviderConfig, ProviderType, StopReason, ToolCall, ToolCallMode, ToolDefinition, UsageStats,
};
use crate::http_client::build_http_client;

/// Application title sent to OpenRouter.
const APP_TITLE: &str = "Analytics Agent";

/// Chat-completions provider
pub struct OpenAICompatibleProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenAICompatibleProvider {
    /// Create a provider with the given configuration
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let client = build_http_client(Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self { config, client })
    }

    /// Build the request body for the API
    fn build_request_body(
        &self,
        messages: &[Message],
        system: Option<&str>,
        tools: &[ToolDefinition],
        request_options: &LlmRequestOptions,
    ) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": request_options
                .temperature_override
                .unwrap_or(self.config.temperature),
        });

        let mut openai_messages: Vec<Value> = Vec::with_capacity(messages.len() + 1);
        if let Some(sys) = system {
            openai_messages.push(json!({ "role": "system", "content": sys }));
        }
        for msg in messages {
            openai_messages.push(message_to_openai(msg));
        }
        body["messages"] = Value::Array(openai_messages);

        // Tool definitions stay in the request even with tools disabled:
        // prior turns reference them and some providers reject orphaned calls.
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(tool_to_openai).collect());
            match request_options.tool_call_mode {
                ToolCallMode::Auto => {}
                ToolCallMode::Required => body["tool_choice"] = json!("required"),
                ToolCallMode::None => body["tool_choice"] = json!("none"),
            }
        }

        if let Value::Object(map) = &mut body {
            for (key, value) in &self.config.options {
                map.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        body
    }

    /// Parse a response from the API
    fn parse_response(&self, response: OpenAIResponse) -> LlmResponse {
        let choice = response.choices.into_iter().next();

        let mut content = None;
        let mut tool_calls = Vec::new();
        let mut finish_reason = None;

        if let Some(choice) = choice {
            finish_reason = choice.finish_reason;
            if let Some(msg) = choice.message {
                content = msg.content;
                for tc in msg.tool_calls.unwrap_or_default() {
                    tool_calls.push(ToolCall {
                        id: tc.id,
                        name: tc.function.name,
                        arguments: parse_arguments(&tc.function.arguments),
                    });
                }
            }
        }

        let stop_reason = finish_reason
            .as_deref()
            .map(StopReason::from)
            .unwrap_or(StopReason::EndTurn);

        let usage = response
            .usage
            .map(|u| UsageStats {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        LlmResponse {
            content,
            tool_calls,
            stop_reason,
            usage,
            model: response.model.unwrap_or_else(|| self.config.model.clone()),
        }
    }
}

/// Convert a Message to OpenAI API format
fn message_to_openai(message: &Message) -> Value {
    let role = match message.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    };

    // Tool results are sent as separate `tool` messages
    for content in &message.content {
        if let MessageContent::ToolResult {
            tool_use_id,
            content,
            ..
        } = content
        {
            return json!({
                "role": "tool",
                "tool_call_id": tool_use_id,
                "content": content,
            });
        }
    }

    let tool_calls: Vec<Value> = message
        .content
        .iter()
        .filter_map(|c| match c {
            MessageContent::ToolUse { id, name, input } => Some(json!({
                "id": id,
                "type": "function",
                "function": { "name": name, "arguments": input.to_string() }
            })),
            _ => None,
        })
        .collect();

    let text = message.text_content();

    if tool_calls.is_empty() {
        return json!({ "role": role, "content": text });
    }

    // Always include content; some compatible APIs require the field.
    json!({
        "role": role,
        "content": if text.is_empty() { Value::Null } else { Value::String(text) },
        "tool_calls": tool_calls,
    })
}

/// Convert a ToolDefinition to OpenAI API format
fn tool_to_openai(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema
        }
    })
}

/// Tool arguments arrive as a JSON-encoded string. Unparseable arguments are
/// kept verbatim so input validation can report them.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[async_trait]
impl LlmProvider for OpenAICompatibleProvider {
    fn name(&self) -> &'static str {
        match self.config.provider {
            ProviderType::OpenRouter => "openrouter",
            ProviderType::OpenAI => "openai",
        }
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
        let api_key = self
            .config
            .api_key
            .as_ref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| missing_api_key_error(self.name()))?;

        let body = self.build_request_body(&messages, system.as_deref(), &tools, &request_options);

        let mut request = self
            .client
            .post(self.config.endpoint())
            .bearer_auth(api_key)
            .json(&body);
        if self.config.provider == ProviderType::OpenRouter {
            request = request.header("X-Title", APP_TITLE);
            if let Some(referer) = &self.config.referer {
                request = request.header("HTTP-Referer", referer);
            }
        }

        let response = request.send().await.map_err(|e| LlmError::NetworkError {
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok());
        let body_text = response.text().await.map_err(|e| LlmError::NetworkError {
            message: e.to_string(),
        })?;

        if !(200..300).contains(&status) {
            return Err(parse_http_error(status, &body_text, self.name(), retry_after));
        }

        let parsed: OpenAIResponse =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ParseError {
                message: format!("Failed to parse response: {}", e),
            })?;

        // OpenRouter reports upstream failures inside a 200 body.
        if let Some(error) = parsed.error {
            let code = error.code.as_ref().and_then(Value::as_u64).unwrap_or(500);
            return Err(parse_http_error(
                u16::try_from(code).unwrap_or(500),
                &error.message,
                self.name(),
                retry_after,
            ));
        }

        Ok(self.parse_response(parsed))
    }

    async fn health_check(&self) -> LlmResult<()> {
        match &self.config.api_key {
            Some(key) if !key.is_empty() => Ok(()),
            _ => Err(missing_api_key_error(self.name())),
        }
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ResponseUsage>,
    #[serde(default)]
    error: Option<ResponseError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ResponseError {
    message: String,
    #[serde(default)]
    code: Option<Value>,
}
