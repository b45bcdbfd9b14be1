//! Response Types
//!
//! JSON bodies of every HTTP endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use analytics_agent_core::{CoreError, ErrorKind, ToolCallStatus, Turn};

pub const SERVICE_NAME: &str = "ClickHouse Analytics Agent";

/// Current time as RFC 3339, used for every `timestamp` field.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Body of `POST /api/analyze`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// One entry of the tool-call log returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallSummary {
    pub tool: String,
    pub input: Value,
    pub status: ToolCallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Result of one analyze request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub session_id: String,
    pub text_output: String,
    /// `data:image/png;base64,...` URIs in creation order.
    pub plots: Vec<String>,
    pub tool_calls: Vec<ToolCallSummary>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub truncated: bool,
    pub timestamp: String,
}

impl AnalyzeResponse {
    /// A request rejected before its run started.
    pub fn rejected(session_id: impl Into<String>, error: &CoreError) -> Self {
        Self {
            success: false,
            session_id: session_id.into(),
            text_output: String::new(),
            plots: Vec::new(),
            tool_calls: Vec::new(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            truncated: false,
            timestamp: timestamp(),
        }
    }
}

/// Error body for non-analyze endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_kind: ErrorKind,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            error_kind: kind,
            timestamp: timestamp(),
        }
    }
}

/// `GET /`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannerResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub model: String,
    pub timestamp: String,
}

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` when every dependency answers, otherwise `degraded`.
    pub status: String,
    pub version: String,
    pub service: String,
    pub database: bool,
    pub history: bool,
    pub timestamp: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            service: SERVICE_NAME.to_string(),
            database: false,
            history: false,
            timestamp: timestamp(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoLimits {
    pub max_iterations: u32,
    pub max_history_turns: usize,
    pub request_deadline_secs: u64,
    pub row_limit: u64,
    pub sandbox_timeout_secs: u64,
    pub sandbox_memory_mb: u64,
    pub artifact_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxInfo {
    pub interpreter: Option<String>,
    pub version: Option<String>,
    pub analysis_stack: bool,
}

/// `GET /api/info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub service: String,
    pub version: String,
    pub model: String,
    pub database: String,
    pub tools: Vec<String>,
    pub features: Vec<String>,
    pub limits: InfoLimits,
    pub sandbox: SandboxInfo,
    pub timestamp: String,
}

/// `GET /api/chat-stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStatsResponse {
    pub db_path: String,
    pub db_size_mb: f64,
    pub sessions: i64,
    pub turns: i64,
    pub live_artifacts: usize,
    pub timestamp: String,
}

/// `POST /api/session/new`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

/// `GET /api/session/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetailsResponse {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub total_turns: usize,
    pub user_turns: usize,
    pub has_history: bool,
    pub turns: Vec<Turn>,
}

/// `POST /api/session/{id}/close`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseSessionResponse {
    pub session_id: String,
    pub closed: bool,
    pub released_artifacts: usize,
}
