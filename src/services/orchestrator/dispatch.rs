//! Tool Dispatch
//!
//! Routes a validated `ToolInvocation` to its executor and shapes the output
//! the reasoning model sees. Every executor await races the run's
//! cancellation token and deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use analytics_agent_core::{
    ChartArtifact, CoreError, CoreResult, ExecutionContext, ToolCallRecord, ToolContext,
};
use analytics_agent_llm::ToolCall;
use analytics_agent_sandbox::{CodeSandbox, SandboxOutput, SandboxRequest};
use analytics_agent_tools::{ToolInvocation, ToolResult};

use crate::services::artifacts::ArtifactStore;
use crate::services::query_executor::QueryExecutor;
use crate::services::schema::SchemaIntrospector;

/// Executors reachable from the run loop.
pub struct ToolDispatcher {
    schema: Arc<SchemaIntrospector>,
    queries: Arc<QueryExecutor>,
    sandbox: Arc<dyn CodeSandbox>,
    artifacts: Arc<ArtifactStore>,
}

/// Outcome of one call: the audit record, its charts, and whether the run
/// was cancelled while it was in flight.
pub struct Dispatched {
    pub record: ToolCallRecord,
    pub charts: Vec<ChartArtifact>,
    pub cancelled: Option<CoreError>,
}

impl ToolDispatcher {
    pub fn new(
        schema: Arc<SchemaIntrospector>,
        queries: Arc<QueryExecutor>,
        sandbox: Arc<dyn CodeSandbox>,
        artifacts: Arc<ArtifactStore>,
    ) -> Self {
        Self {
            schema,
            queries,
            sandbox,
            artifacts,
        }
    }

    /// Validate and run one requested call.
    pub async fn dispatch(
        &self,
        ctx: &ToolContext,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Dispatched {
        let started = Instant::now();
        let result = match ToolInvocation::parse(&call.name, &call.arguments) {
            Ok(invocation) => {
                tracing::info!(
                    session_id = ctx.session_id(),
                    tool = %invocation.tool(),
                    call_id = %call.id,
                    "dispatching tool"
                );
                self.run(ctx, invocation, cancel).await
            }
            Err(e) => {
                tracing::warn!(session_id = ctx.session_id(), tool = %call.name, error = %e, "invalid tool call");
                ToolResult::err(&e)
            }
        };

        let cancelled = if cancel.is_cancelled() {
            Some(CoreError::cancelled("run cancelled"))
        } else if ctx.is_expired() {
            Some(CoreError::cancelled("request deadline exceeded"))
        } else {
            None
        };
        let elapsed = started.elapsed().as_millis() as u64;
        if let Some(error) = &result.error {
            tracing::warn!(session_id = ctx.session_id(), tool = %call.name, elapsed_ms = elapsed, "tool failed: {}", error);
        }

        let (record, charts) = result.into_record(&call.id, &call.name, call.arguments.clone(), elapsed);
        Dispatched {
            record,
            charts,
            cancelled,
        }
    }

    async fn run(
        &self,
        ctx: &ToolContext,
        invocation: ToolInvocation,
        cancel: &CancellationToken,
    ) -> ToolResult {
        match invocation {
            ToolInvocation::SchemaIntrospect { table } => {
                bounded(ctx, cancel, self.schema.describe(table.as_deref()))
                    .await
                    .into()
            }
            ToolInvocation::QueryExecute { sql } => {
                bounded(ctx, cancel, self.queries.execute(ctx.session_id(), &sql))
                    .await
                    .map(|summary| summary.to_output())
                    .into()
            }
            ToolInvocation::SandboxExecute {
                code,
                artifact_handle,
            } => {
                let artifact = match self.artifacts.resolve(ctx.session_id(), &artifact_handle) {
                    Ok(artifact) => artifact,
                    Err(e) => return ToolResult::err(&e),
                };
                let request = SandboxRequest::new(code, artifact.path);
                match bounded(ctx, cancel, self.sandbox.execute(request, cancel)).await {
                    Ok(output) => sandbox_result(output),
                    Err(e) => ToolResult::err(&e),
                }
            }
        }
    }
}

/// Race `work` against cancellation and the run deadline.
async fn bounded<T, F>(ctx: &ToolContext, cancel: &CancellationToken, work: F) -> CoreResult<T>
where
    F: Future<Output = CoreResult<T>>,
{
    let deadline = ctx.deadline().map(tokio::time::Instant::from_std);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CoreError::cancelled("run cancelled")),
        _ = sleep_until(deadline) => Err(CoreError::cancelled("request deadline exceeded")),
        result = work => result,
    }
}

/// Sleep until `deadline`, or forever when there is none.
pub(crate) async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Model-facing output of a sandbox run. A program error still returns the
/// charts drawn before it failed.
fn sandbox_result(output: SandboxOutput) -> ToolResult {
    let charts: Vec<Value> = output
        .charts
        .iter()
        .enumerate()
        .map(|(index, chart)| {
            json!({
                "index": index,
                "format": chart.format,
                "width": chart.width,
                "height": chart.height,
                "ref": chart.content_ref(),
            })
        })
        .collect();

    match output.error {
        Some(error) => ToolResult::err(&CoreError::sandbox(error)).with_charts(output.charts),
        None => ToolResult::ok(json!({
            "stdout": output.stdout,
            "stdout_truncated": output.stdout_truncated,
            "result": output.result,
            "charts": charts,
        }))
        .with_charts(output.charts),
    }
}
