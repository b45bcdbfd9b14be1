//! Analytics Agent Tools
//!
//! The tool layer between the reasoning model and the executors:
//! - `definitions` - JSON-schema definitions advertised to the model
//! - `invocation` - typed, validated `ToolInvocation` parsed from raw calls
//! - `executor` - `ToolResult` produced by a dispatch
//! - `sql_guard` - read-only statement filter and automatic row limit
//! - `compaction` - reduced replay form of consumed tool results
//!
//! Executors themselves (database, sandbox) live in the application crate
//! and in `analytics-agent-sandbox`.

pub mod compaction;
pub mod definitions;
pub mod executor;
pub mod invocation;
pub mod sql_guard;

// Re-export core types
pub use compaction::{compact_output, compact_record_content, truncate_chars};
pub use definitions::{tool_definition, tool_definitions};
pub use executor::ToolResult;
pub use invocation::ToolInvocation;
pub use sql_guard::{apply_row_limit, ensure_read_only};
