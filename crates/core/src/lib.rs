//! Analytics Agent Core
//!
//! Error taxonomy, tool vocabulary, session and artifact types, and the
//! context hierarchy shared by every crate in the workspace. This crate has
//! no dependency on storage, HTTP, or model providers.
//!
//! ## Module Organization
//!
//! - `error` - `CoreError`, `ErrorKind`, `CoreResult`
//! - `context` - `ExecutionContext`, `RunContext`, `ToolContext`
//! - `tool` - closed tool set (`ToolName`) and audit records (`ToolCallRecord`)
//! - `session` - `Turn`, `TurnContent`, `SessionInfo`
//! - `artifact` - `AnalysisArtifact`, `ChartArtifact`
//! - `builders` - validated `RunLimits`

pub mod artifact;
pub mod builders;
pub mod context;
pub mod error;
pub mod session;
pub mod tool;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult, ErrorKind};

// ── Context Hierarchy ──────────────────────────────────────────────────
pub use context::{ExecutionContext, RunContext, ToolContext};

// ── Tools ──────────────────────────────────────────────────────────────
pub use tool::{ToolCallRecord, ToolCallStatus, ToolName};

// ── Sessions ───────────────────────────────────────────────────────────
pub use session::{validate_session_id, RequestedToolCall, SessionInfo, Turn, TurnContent, TurnRole};

// ── Artifacts ──────────────────────────────────────────────────────────
pub use artifact::{AnalysisArtifact, ArtifactRef, ChartArtifact, ChartFormat, ColumnSchema};

// ── Limits ─────────────────────────────────────────────────────────────
pub use builders::{RunLimits, RunLimitsBuilder};
