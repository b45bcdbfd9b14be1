//! Response Assembler
//!
//! Pure conversion of a finished run into the client-facing response.

use serde_json::Value;

use analytics_agent_core::ToolCallRecord;
use analytics_agent_tools::truncate_chars;

use crate::models::response::{timestamp, AnalyzeResponse, ToolCallSummary};
use crate::services::orchestrator::RunOutcome;

/// Characters kept from each string in a logged tool input.
pub const LOGGED_INPUT_CHARS: usize = 300;

pub fn assemble(outcome: &RunOutcome) -> AnalyzeResponse {
    let success = outcome.succeeded();
    AnalyzeResponse {
        success,
        session_id: outcome.session_id.clone(),
        text_output: if success { outcome.text.clone() } else { String::new() },
        plots: outcome.charts.iter().map(|c| c.to_data_uri()).collect(),
        tool_calls: outcome.tool_calls.iter().map(summarize).collect(),
        error: outcome.error.as_ref().map(|e| e.message.clone()),
        error_kind: outcome.error.as_ref().map(|e| e.kind),
        truncated: outcome.truncated,
        timestamp: timestamp(),
    }
}

fn summarize(record: &ToolCallRecord) -> ToolCallSummary {
    ToolCallSummary {
        tool: record.tool.clone(),
        input: truncate_strings(&record.input, LOGGED_INPUT_CHARS),
        status: record.status,
        error_kind: record.error_kind,
        error: record.error.clone(),
        duration_ms: record.duration_ms,
    }
}

/// Copy of `value` with every string truncated to `max` characters.
fn truncate_strings(value: &Value, max: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_chars(s, max)),
        Value::Array(items) => Value::Array(items.iter().map(|v| truncate_strings(v, max)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), truncate_strings(v, max)))
                .collect(),
        ),
        other => other.clone(),
    }
}
