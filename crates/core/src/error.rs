//! Core Error Types
//!
//! The error taxonomy shared by every layer of the analytics agent. Each
//! variant corresponds to one failure class the orchestrator has to reason
//! about: some are folded back into the reasoning context as tool errors,
//! some abort the run, and some are rejected before a run starts.
//!
//! The application crate wraps these in `AppError` together with storage and
//! transport failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error type for the analytics agent workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The analytical database could not be reached.
    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(String),

    /// A statement was refused by the read-only guard before execution.
    #[error("Query rejected: {0}")]
    QueryRejected(String),

    /// The database accepted the statement but execution failed (syntax, timeout).
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Analysis code raised, timed out, or breached a resource limit.
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// The reasoning model kept failing after bounded retries.
    #[error("Reasoning model unavailable: {0}")]
    ReasoningUnavailable(String),

    /// Another run currently holds the session.
    #[error("Session busy: {0}")]
    SessionBusy(String),

    /// The session id does not exist.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Invalid input (unknown tool, bad arguments, empty query).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The run was cancelled or exceeded its deadline.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

/// Serializable tag for a `CoreError`, carried in tool-call records and
/// API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigurationError,
    DatabaseUnavailable,
    QueryRejected,
    QueryFailed,
    SandboxError,
    ReasoningUnavailable,
    SessionBusy,
    SessionNotFound,
    ValidationError,
    Cancelled,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigurationError => "configuration_error",
            ErrorKind::DatabaseUnavailable => "database_unavailable",
            ErrorKind::QueryRejected => "query_rejected",
            ErrorKind::QueryFailed => "query_failed",
            ErrorKind::SandboxError => "sandbox_error",
            ErrorKind::ReasoningUnavailable => "reasoning_unavailable",
            ErrorKind::SessionBusy => "session_busy",
            ErrorKind::SessionNotFound => "session_not_found",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CoreError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn database_unavailable(msg: impl Into<String>) -> Self {
        Self::DatabaseUnavailable(msg.into())
    }

    pub fn query_rejected(msg: impl Into<String>) -> Self {
        Self::QueryRejected(msg.into())
    }

    pub fn query_failed(msg: impl Into<String>) -> Self {
        Self::QueryFailed(msg.into())
    }

    pub fn sandbox(msg: impl Into<String>) -> Self {
        Self::Sandbox(msg.into())
    }

    pub fn reasoning_unavailable(msg: impl Into<String>) -> Self {
        Self::ReasoningUnavailable(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The serializable tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Config(_) => ErrorKind::ConfigurationError,
            CoreError::DatabaseUnavailable(_) => ErrorKind::DatabaseUnavailable,
            CoreError::QueryRejected(_) => ErrorKind::QueryRejected,
            CoreError::QueryFailed(_) => ErrorKind::QueryFailed,
            CoreError::Sandbox(_) => ErrorKind::SandboxError,
            CoreError::ReasoningUnavailable(_) => ErrorKind::ReasoningUnavailable,
            CoreError::SessionBusy(_) => ErrorKind::SessionBusy,
            CoreError::SessionNotFound(_) => ErrorKind::SessionNotFound,
            CoreError::Validation(_) => ErrorKind::ValidationError,
            CoreError::Cancelled(_) => ErrorKind::Cancelled,
            CoreError::Io(_) | CoreError::Serialization(_) | CoreError::Internal(_) => {
                ErrorKind::InternalError
            }
        }
    }

    /// Whether this error is reported to the reasoning model as a tool result
    /// instead of aborting the run.
    pub fn is_tool_level(&self) -> bool {
        matches!(
            self,
            CoreError::DatabaseUnavailable(_)
                | CoreError::QueryRejected(_)
                | CoreError::QueryFailed(_)
                | CoreError::Sandbox(_)
                | CoreError::Validation(_)
                | CoreError::Io(_)
                | CoreError::Serialization(_)
                | CoreError::Internal(_)
        )
    }
}

/// Convert CoreError to a string
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::config("OPENROUTER_API_KEY is not set");
        assert_eq!(
            err.to_string(),
            "Configuration error: OPENROUTER_API_KEY is not set"
        );
    }

    #[test]
    fn test_error_conversion() {
        let err = CoreError::query_rejected("DROP is not allowed");
        let msg: String = err.into();
        assert!(msg.starts_with("Query rejected"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
        assert_eq!(core_err.kind(), ErrorKind::InternalError);
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            CoreError::sandbox("boom").kind(),
            ErrorKind::SandboxError
        );
        assert_eq!(
            CoreError::SessionBusy("s1".into()).kind(),
            ErrorKind::SessionBusy
        );
        assert_eq!(ErrorKind::QueryRejected.as_str(), "query_rejected");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::DatabaseUnavailable).unwrap();
        assert_eq!(json, "\"database_unavailable\"");
    }

    #[test]
    fn test_tool_level_classification() {
        assert!(CoreError::query_failed("syntax").is_tool_level());
        assert!(CoreError::sandbox("timeout").is_tool_level());
        assert!(!CoreError::reasoning_unavailable("503").is_tool_level());
        assert!(!CoreError::SessionBusy("s1".into()).is_tool_level());
        assert!(!CoreError::config("missing").is_tool_level());
    }
}
