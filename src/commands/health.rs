//! Health Check Commands
//!
//! Banner, liveness and service metadata.

use analytics_agent_core::ToolName;

use crate::models::response::{
    timestamp, BannerResponse, HealthResponse, InfoLimits, InfoResponse, SERVICE_NAME,
};
use crate::state::AppState;

const FEATURES: &[&str] = &[
    "natural-language-to-sql",
    "read-only-sql-guard",
    "parquet-artifacts",
    "python-sandbox",
    "chart-generation",
    "session-memory",
];

/// `GET /`
pub fn get_banner(state: &AppState) -> BannerResponse {
    BannerResponse {
        status: "online".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.config().llm.model.clone(),
        timestamp: timestamp(),
    }
}

/// `GET /health`
pub async fn get_health(state: &AppState) -> HealthResponse {
    let mut health = HealthResponse::default();

    health.database = match state.analytics_db().ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "analytics database health check failed");
            false
        }
    };
    health.history = state.history().is_healthy();

    health.status = if health.database && health.history {
        "healthy".to_string()
    } else {
        "degraded".to_string()
    };

    health
}

/// `GET /api/info`
pub fn get_info(state: &AppState) -> InfoResponse {
    let config = state.config();
    let limits = state.orchestrator().config().limits.clone();
    InfoResponse {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: config.llm.model.clone(),
        database: state.analytics_db().describe(),
        tools: ToolName::ALL.iter().map(|t| t.as_str().to_string()).collect(),
        features: FEATURES.iter().map(|f| f.to_string()).collect(),
        limits: InfoLimits {
            max_iterations: limits.max_iterations,
            max_history_turns: limits.max_history_turns,
            request_deadline_secs: limits.deadline.as_secs(),
            row_limit: config.agent.row_limit,
            sandbox_timeout_secs: config.sandbox_limits().wall_clock.as_secs(),
            sandbox_memory_mb: config.sandbox_limits().memory_bytes / (1024 * 1024),
            artifact_ttl_secs: config.artifact_ttl().as_secs(),
        },
        sandbox: state.sandbox_info().clone(),
        timestamp: timestamp(),
    }
}
