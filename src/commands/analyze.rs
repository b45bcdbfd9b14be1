//! Analyze Command
//!
//! `POST /api/analyze`: one question in, one assembled answer out.

use tokio_util::sync::CancellationToken;

use analytics_agent_core::CoreError;

use crate::commands::CommandResponse;
use crate::models::response::{AnalyzeRequest, AnalyzeResponse};
use crate::services::assembler::assemble;
use crate::services::orchestrator::RunOptions;
use crate::state::AppState;
use crate::utils::error::{AppError, AppResult};

/// Run one analysis.
///
/// The run executes on its own task. If this future is dropped (the client
/// went away) the run is cancelled; it still records what it did and
/// releases the session.
pub async fn analyze(
    state: &AppState,
    request: AnalyzeRequest,
) -> AppResult<CommandResponse<AnalyzeResponse>> {
    let query = request.query.trim().to_string();
    if query.is_empty() {
        return Err(AppError::bad_request("query cannot be empty"));
    }
    let session_id = request
        .session_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let cancel = CancellationToken::new();
    let _disconnect = cancel.clone().drop_guard();
    let orchestrator = state.orchestrator().clone();
    let task = tokio::spawn({
        let session_id = session_id.clone();
        async move {
            orchestrator
                .run(&session_id, &query, RunOptions { cancel, deadline: None })
                .await
        }
    });

    let result = task
        .await
        .map_err(|e| AppError::internal(format!("analysis task failed: {}", e)))?;

    match result {
        Ok(outcome) => Ok(CommandResponse::ok(assemble(&outcome))),
        Err(CoreError::Validation(msg)) => Err(AppError::bad_request(msg)),
        Err(e @ CoreError::SessionBusy(_)) => {
            tracing::warn!(session_id = %session_id, "session busy, request rejected");
            Ok(CommandResponse::with_status(
                409,
                AnalyzeResponse::rejected(&session_id, &e),
            ))
        }
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "run could not start");
            Ok(CommandResponse::ok(AnalyzeResponse::rejected(&session_id, &e)))
        }
    }
}
