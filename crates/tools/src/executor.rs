//! Tool Executor Core Types
//!
//! The result of one tool dispatch, before it is turned into an audit record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use analytics_agent_core::{ChartArtifact, CoreError, ErrorKind, ToolCallRecord};

/// Result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the execution was successful
    pub success: bool,
    /// Structured output (if successful)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Charts produced by the call. Returned to the client, never to the model.
    #[serde(skip)]
    pub charts: Vec<ChartArtifact>,
}

impl ToolResult {
    /// Create a successful result
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            error_kind: None,
            charts: Vec::new(),
        }
    }

    /// Create an error result
    pub fn err(error: &CoreError) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            charts: Vec::new(),
        }
    }

    /// Attach charts to a successful result.
    pub fn with_charts(mut self, charts: Vec<ChartArtifact>) -> Self {
        self.charts = charts;
        self
    }

    /// Split into the audit record and the chart payloads.
    pub fn into_record(
        self,
        call_id: &str,
        tool: &str,
        input: Value,
        duration_ms: u64,
    ) -> (ToolCallRecord, Vec<ChartArtifact>) {
        let chart_refs = self.charts.iter().map(ChartArtifact::content_ref).collect();
        let record = ToolCallRecord {
            id: call_id.to_string(),
            tool: tool.to_string(),
            input,
            status: if self.success {
                analytics_agent_core::ToolCallStatus::Ok
            } else {
                analytics_agent_core::ToolCallStatus::Failed
            },
            output: self.output,
            error: self.error,
            error_kind: self.error_kind,
            duration_ms,
            chart_refs,
        };
        (record, self.charts)
    }
}

impl From<Result<Value, CoreError>> for ToolResult {
    fn from(result: Result<Value, CoreError>) -> Self {
        match result {
            Ok(value) => ToolResult::ok(value),
            Err(err) => ToolResult::err(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_agent_core::ChartFormat;
    use serde_json::json;

    #[test]
    fn test_tool_result_ok() {
        let result = ToolResult::ok(json!({"row_count": 3}));
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.output, Some(json!({"row_count": 3})));
    }

    #[test]
    fn test_tool_result_err() {
        let result = ToolResult::err(&CoreError::query_failed("Syntax error at position 7"));
        assert!(!result.success);
        assert!(result.output.is_none());
        assert_eq!(result.error_kind, Some(ErrorKind::QueryFailed));
        assert!(result.error.unwrap().starts_with("Query failed"));
    }

    #[test]
    fn test_into_record_keeps_chart_refs_only() {
        let chart = ChartArtifact::new(ChartFormat::Png, 2, 2, vec![9, 9, 9]);
        let expected_ref = chart.content_ref();
        let result = ToolResult::ok(json!({"result": "ok"})).with_charts(vec![chart]);

        let (record, charts) = result.into_record("c1", "sandbox-execute", json!({"code": "x"}), 40);
        assert!(record.is_ok());
        assert_eq!(record.duration_ms, 40);
        assert_eq!(record.chart_refs, vec![expected_ref]);
        assert_eq!(charts.len(), 1);
    }

    #[test]
    fn test_from_result() {
        let ok: ToolResult = Ok(json!(1)).into();
        assert!(ok.success);
        let failed: ToolResult = Err(CoreError::sandbox("NameError")).into();
        assert_eq!(failed.error_kind, Some(ErrorKind::SandboxError));
    }
}
