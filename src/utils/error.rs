//! Error Handling
//!
//! Application-level error type. Wraps `CoreError` from the workspace crates
//! and adds storage and transport failures that only the service sees.

use thiserror::Error;

use analytics_agent_core::{CoreError, ErrorKind};

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Errors from the shared taxonomy (query, sandbox, session, ...)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite errors (auto-converted from rusqlite::Error)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed HTTP request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request body over the configured limit
    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Server transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Taxonomy tag reported to clients.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Core(e) => e.kind(),
            AppError::Config(_) => ErrorKind::ConfigurationError,
            AppError::BadRequest(_) | AppError::PayloadTooLarge(_) => ErrorKind::ValidationError,
            AppError::NotFound(_) => ErrorKind::SessionNotFound,
            _ => ErrorKind::InternalError,
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::PayloadTooLarge(_) => 413,
            AppError::Core(CoreError::Validation(_)) => 400,
            AppError::Core(CoreError::SessionNotFound(_)) => 404,
            AppError::Core(CoreError::SessionBusy(_)) => 409,
            AppError::Core(CoreError::DatabaseUnavailable(_))
            | AppError::Core(CoreError::ReasoningUnavailable(_)) => 503,
            _ => 500,
        }
    }
}

/// Storage failures surface to callers of the core traits as internal errors.
impl From<AppError> for CoreError {
    fn from(err: AppError) -> CoreError {
        match err {
            AppError::Core(core) => core,
            AppError::NotFound(msg) => CoreError::SessionNotFound(msg),
            AppError::BadRequest(msg) => CoreError::Validation(msg),
            AppError::Config(msg) => CoreError::Config(msg),
            other => CoreError::internal(other.to_string()),
        }
    }
}
