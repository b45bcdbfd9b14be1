//! Tool Vocabulary
//!
//! The closed set of capabilities the reasoning model may request, and the
//! audit record written for every attempted call.
//!
//! Tool names are matched against `ToolName` before anything is executed.
//! A name outside the set still produces a `ToolCallRecord` (status
//! `failed`), so the audit log reflects every request the model made.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, ErrorKind};

// ============================================================================
// ToolName
// ============================================================================

/// The closed tool set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolName {
    #[serde(rename = "schema-introspect")]
    SchemaIntrospect,
    #[serde(rename = "query-execute")]
    QueryExecute,
    #[serde(rename = "sandbox-execute")]
    SandboxExecute,
}

impl ToolName {
    pub const ALL: [ToolName; 3] = [
        ToolName::SchemaIntrospect,
        ToolName::QueryExecute,
        ToolName::SandboxExecute,
    ];

    /// Wire name used in tool definitions and audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SchemaIntrospect => "schema-introspect",
            ToolName::QueryExecute => "query-execute",
            ToolName::SandboxExecute => "sandbox-execute",
        }
    }

    /// Look up a tool by its wire name.
    ///
    /// Underscore spellings (`query_execute`) are accepted because some
    /// providers normalize hyphens in function names.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str().eq_ignore_ascii_case(&normalized))
    }
}

impl FromStr for ToolName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::validation(format!("Unknown tool: {}", s)))
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ToolCallRecord
// ============================================================================

/// Outcome status of one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Ok,
    Failed,
}

/// Audit record for a single tool invocation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Provider-assigned call id, echoed back with the result.
    pub id: String,
    /// Tool name exactly as the model requested it.
    pub tool: String,
    /// Input mapping as the model supplied it.
    pub input: Value,
    pub status: ToolCallStatus,
    /// Raw tool output on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub duration_ms: u64,
    /// Content-addressed references (`sha256:<hex>`) of charts produced by
    /// this call. Chart bytes are never persisted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chart_refs: Vec<String>,
}

impl ToolCallRecord {
    /// Record a successful call.
    pub fn succeeded(
        id: impl Into<String>,
        tool: impl Into<String>,
        input: Value,
        output: Value,
    ) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            input,
            status: ToolCallStatus::Ok,
            output: Some(output),
            error: None,
            error_kind: None,
            duration_ms: 0,
            chart_refs: Vec::new(),
        }
    }

    /// Record a failed call.
    pub fn failed(
        id: impl Into<String>,
        tool: impl Into<String>,
        input: Value,
        error: &CoreError,
    ) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            input,
            status: ToolCallStatus::Failed,
            output: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            duration_ms: 0,
            chart_refs: Vec::new(),
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ToolCallStatus::Ok
    }

    /// Resolved tool, if the requested name is in the closed set.
    pub fn tool_name(&self) -> Option<ToolName> {
        ToolName::parse(&self.tool)
    }

    /// Text handed back to the reasoning model for this call.
    pub fn to_model_content(&self) -> String {
        match (&self.status, &self.output) {
            (ToolCallStatus::Ok, Some(output)) => output.to_string(),
            (ToolCallStatus::Ok, None) => "{}".to_string(),
            (ToolCallStatus::Failed, _) => serde_json::json!({
                "success": false,
                "error_kind": self.error_kind.map(|k| k.as_str()),
                "error": self.error,
            })
            .to_string(),
        }
    }
}
