//! Session Commands
//!
//! Creation, inspection and closing of conversation sessions, plus
//! history database statistics.

use crate::models::response::{
    timestamp, ChatStatsResponse, CloseSessionResponse, NewSessionResponse,
    SessionDetailsResponse,
};
use crate::state::AppState;
use crate::utils::error::{AppError, AppResult};

/// `POST /api/session/new`
pub async fn new_session(state: &AppState) -> AppResult<NewSessionResponse> {
    let info = state.store().create().await?;
    Ok(NewSessionResponse {
        session_id: info.id,
        created_at: info.created_at,
    })
}

/// `GET /api/session/{id}`. Unknown ids are a 404.
pub async fn get_session(state: &AppState, session_id: &str) -> AppResult<SessionDetailsResponse> {
    let info = state
        .store()
        .get(session_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("session '{}'", session_id)))?;
    let turns = state.store().load(session_id).await?;
    let user_turns = turns.iter().filter(|t| t.is_user_question()).count();

    Ok(SessionDetailsResponse {
        session_id: info.id,
        created_at: info.created_at,
        closed_at: info.closed_at,
        total_turns: turns.len(),
        user_turns,
        has_history: !turns.is_empty(),
        turns,
    })
}

/// `POST /api/session/{id}/close`: record the close and drop the
/// session's artifacts.
///
/// Waits for an in-flight run on the same session like a second analyze
/// request would, and fails with `SessionBusy` after the same wait.
pub async fn close_session(state: &AppState, session_id: &str) -> AppResult<CloseSessionResponse> {
    if state.store().get(session_id).await?.is_none() {
        return Err(AppError::not_found(format!("session '{}'", session_id)));
    }
    let _guard = state.locks().acquire(session_id).await?;
    let closed = state.store().close(session_id).await?;
    let released_artifacts = state.artifacts().release_session(session_id);
    tracing::info!(session_id, released_artifacts, "session closed");

    Ok(CloseSessionResponse {
        session_id: session_id.to_string(),
        closed,
        released_artifacts,
    })
}

/// `GET /api/chat-stats`
pub async fn get_chat_stats(state: &AppState) -> AppResult<ChatStatsResponse> {
    let stats = state.store().stats().await?;
    let size = state.history().file_size_bytes() as f64 / (1024.0 * 1024.0);

    Ok(ChatStatsResponse {
        db_path: state
            .history()
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string()),
        db_size_mb: (size * 100.0).round() / 100.0,
        sessions: stats.sessions,
        turns: stats.turns,
        live_artifacts: state.artifacts().len(),
        timestamp: timestamp(),
    })
}
