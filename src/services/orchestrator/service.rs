//! Orchestrator Service
//!
//! Drives one analyze request through the reasoning/tool loop:
//!
//! ```text
//! AwaitingDecision --tool calls--> DispatchingTool --results--> AwaitingDecision
//! AwaitingDecision --text--> Done
//! any state --transport failure | cancel | no usable answer--> Failed
//! ```
//!
//! Every decision and tool result is appended to the session before the loop
//! continues, so the audit log survives cancellation.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use analytics_agent_core::{
    ChartArtifact, CoreError, CoreResult, ErrorKind, ExecutionContext, RequestedToolCall,
    RunContext, RunLimits, ToolCallRecord, Turn,
};
use analytics_agent_llm::{
    send_with_retry, LlmProvider, LlmRequestOptions, LlmResponse, Message, RetryPolicy,
    ToolDefinition,
};
use analytics_agent_tools::tool_definitions;

use super::context_window::build_history;
use super::dispatch::{sleep_until, ToolDispatcher};
use super::prompts::{truncation_notice, FINAL_ANSWER_REQUEST};
use crate::services::session_store::{SessionLocks, SessionStore};

/// Position of a run in the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    AwaitingDecision,
    DispatchingTool,
    Done,
    Failed,
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CoreError> for RunFailure {
    fn from(err: &CoreError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub session_id: String,
    pub text: String,
    pub charts: Vec<ChartArtifact>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub error: Option<RunFailure>,
    pub state: RunState,
    pub iterations: u32,
    /// The iteration bound was hit.
    pub truncated: bool,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Done
    }
}

/// Per-request controls.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub cancel: CancellationToken,
    /// Overrides the configured request deadline.
    pub deadline: Option<Duration>,
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub system_prompt: String,
    pub limits: RunLimits,
    pub retry: RetryPolicy,
}

pub struct OrchestratorService {
    config: OrchestratorConfig,
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn SessionStore>,
    locks: Arc<SessionLocks>,
    dispatcher: ToolDispatcher,
    tools: Vec<ToolDefinition>,
}

/// Mutable state of one run.
struct Run {
    ctx: RunContext,
    cancel: CancellationToken,
    state: RunState,
    iterations: u32,
    messages: Vec<Message>,
    tool_calls: Vec<ToolCallRecord>,
    charts: Vec<ChartArtifact>,
    last_text: Option<String>,
}

impl Run {
    fn deadline(&self) -> Option<tokio::time::Instant> {
        self.ctx.deadline().map(tokio::time::Instant::from_std)
    }

    fn finish(self, text: String, truncated: bool) -> RunOutcome {
        RunOutcome {
            session_id: self.ctx.session_id().to_string(),
            text,
            charts: self.charts,
            tool_calls: self.tool_calls,
            error: None,
            state: RunState::Done,
            iterations: self.iterations,
            truncated,
        }
    }

    fn fail(self, error: &CoreError, truncated: bool) -> RunOutcome {
        tracing::warn!(
            session_id = self.ctx.session_id(),
            run_id = self.ctx.run_id(),
            iterations = self.iterations,
            kind = %error.kind(),
            "run failed: {}",
            error
        );
        RunOutcome {
            session_id: self.ctx.session_id().to_string(),
            text: String::new(),
            charts: self.charts,
            tool_calls: self.tool_calls,
            error: Some(RunFailure::from(error)),
            state: RunState::Failed,
            iterations: self.iterations,
            truncated,
        }
    }
}

impl OrchestratorService {
    pub fn new(
        config: OrchestratorConfig,
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn SessionStore>,
        locks: Arc<SessionLocks>,
        dispatcher: ToolDispatcher,
    ) -> Self {
        Self {
            config,
            provider,
            store,
            locks,
            dispatcher,
            tools: tool_definitions(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Answer `query` within session `session_id`.
    ///
    /// `Err` means the run never started (invalid input, busy session,
    /// history unavailable). Once started, failures are reported in the
    /// outcome.
    pub async fn run(&self, session_id: &str, query: &str, options: RunOptions) -> CoreResult<RunOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CoreError::validation("query cannot be empty"));
        }

        let _guard = tokio::select! {
            biased;
            _ = options.cancel.cancelled() => return Err(CoreError::cancelled("request cancelled while waiting for the session")),
            guard = self.locks.acquire(session_id) => guard?,
        };

        self.store.ensure(session_id).await.map_err(CoreError::from)?;
        let history = self.store.load(session_id).await.map_err(CoreError::from)?;
        let mut messages = build_history(&history, &self.config.limits);
        self.store
            .append(session_id, &Turn::user(query))
            .await
            .map_err(CoreError::from)?;
        messages.push(Message::user(query));

        let run_id = uuid::Uuid::new_v4().to_string();
        let budget = options.deadline.unwrap_or(self.config.limits.deadline);
        tracing::info!(session_id, run_id = %run_id, history_turns = history.len(), "run started");

        let run = Run {
            ctx: RunContext::new(session_id, run_id).with_budget(budget),
            cancel: options.cancel,
            state: RunState::AwaitingDecision,
            iterations: 0,
            messages,
            tool_calls: Vec::new(),
            charts: Vec::new(),
            last_text: None,
        };

        let outcome = self.drive(run).await;
        tracing::info!(
            session_id,
            state = ?outcome.state,
            iterations = outcome.iterations,
            tool_calls = outcome.tool_calls.len(),
            charts = outcome.charts.len(),
            "run finished"
        );
        Ok(outcome)
    }

    async fn drive(&self, mut run: Run) -> RunOutcome {
        loop {
            if run.iterations >= self.config.limits.max_iterations {
                return self.conclude_truncated(run).await;
            }
            run.state = RunState::AwaitingDecision;
            run.iterations += 1;
            tracing::debug!(session_id = run.ctx.session_id(), iteration = run.iterations, "awaiting decision");

            let response = match self.reason(&run, &self.tools, &LlmRequestOptions::default()).await {
                Ok(response) => response,
                Err(e) => return run.fail(&e, false),
            };
            let text = response.text_content().map(str::to_string);

            if !response.has_tool_calls() {
                let Some(text) = text else {
                    let err = CoreError::reasoning_unavailable("the reasoning model returned an empty answer");
                    return run.fail(&err, false);
                };
                if let Err(e) = self.append(&run, Turn::assistant(text.clone())).await {
                    return run.fail(&e, false);
                }
                return run.finish(text, false);
            }

            if text.is_some() {
                run.last_text = text.clone();
            }
            let requested: Vec<RequestedToolCall> = response
                .tool_calls
                .iter()
                .map(|c| RequestedToolCall {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    arguments: c.arguments.clone(),
                })
                .collect();
            if let Err(e) = self.append(&run, Turn::tool_request(text.clone(), requested)).await {
                return run.fail(&e, false);
            }
            run.messages
                .push(Message::assistant_tool_calls(text, &response.tool_calls));

            run.state = RunState::DispatchingTool;
            for call in &response.tool_calls {
                let tool_ctx = run.ctx.create_tool_context(call.id.clone());
                let dispatched = self.dispatcher.dispatch(&tool_ctx, call, &run.cancel).await;
                let record = dispatched.record;

                if let Err(e) = self.append(&run, Turn::tool_result(record.clone())).await {
                    run.tool_calls.push(record);
                    return run.fail(&e, false);
                }
                run.messages.push(Message::tool_result(
                    &call.id,
                    record.to_model_content(),
                    !record.is_ok(),
                ));
                run.tool_calls.push(record);
                run.charts.extend(dispatched.charts);

                if let Some(cancelled) = dispatched.cancelled {
                    return run.fail(&cancelled, false);
                }
            }
        }
    }

    /// One last text-only request after the iteration bound.
    async fn conclude_truncated(&self, mut run: Run) -> RunOutcome {
        let max = self.config.limits.max_iterations;
        tracing::warn!(session_id = run.ctx.session_id(), max_iterations = max, "iteration limit reached");

        run.messages.push(Message::user(FINAL_ANSWER_REQUEST));
        let final_text = match self.reason(&run, &[], &LlmRequestOptions::without_tools()).await {
            Ok(response) => response.text_content().map(str::to_string),
            Err(CoreError::Cancelled(msg)) => return run.fail(&CoreError::Cancelled(msg), true),
            Err(e) => {
                tracing::warn!(session_id = run.ctx.session_id(), error = %e, "final answer request failed");
                None
            }
        };

        let Some(text) = final_text.or_else(|| run.last_text.clone()) else {
            let err = CoreError::internal(format!(
                "no answer was produced within {} reasoning steps",
                max
            ));
            return run.fail(&err, true);
        };
        let text = format!("{}{}", text, truncation_notice(max));
        if let Err(e) = self.append(&run, Turn::assistant(text.clone())).await {
            return run.fail(&e, true);
        }
        run.finish(text, true)
    }

    /// Ask the reasoning model for the next step.
    async fn reason(
        &self,
        run: &Run,
        tools: &[ToolDefinition],
        options: &LlmRequestOptions,
    ) -> CoreResult<LlmResponse> {
        let request = send_with_retry(
            self.provider.as_ref(),
            &run.messages,
            Some(&self.config.system_prompt),
            tools,
            options,
            &self.config.retry,
        );
        tokio::select! {
            biased;
            _ = run.cancel.cancelled() => Err(CoreError::cancelled("run cancelled")),
            _ = sleep_until(run.deadline()) => Err(CoreError::cancelled("request deadline exceeded")),
            response = request => response.map_err(|e| CoreError::reasoning_unavailable(e.to_string())),
        }
    }

    async fn append(&self, run: &Run, turn: Turn) -> CoreResult<()> {
        self.store
            .append(run.ctx.session_id(), &turn)
            .await
            .map_err(CoreError::from)
    }
}
