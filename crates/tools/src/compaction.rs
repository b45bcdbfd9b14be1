//! Tool Result Compaction
//!
//! Tool results that the model has already consumed are replayed in a
//! reduced form: enough to know what was done and which artifacts exist,
//! without the heavy payload.

use serde_json::{json, Value};

use analytics_agent_core::{ToolCallRecord, ToolName};

/// Characters of sandbox `result` kept after compaction.
pub const COMPACT_RESULT_CHARS: usize = 500;

/// Truncate to `max` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// Reduced form of one tool's output.
pub fn compact_output(tool: ToolName, output: &Value) -> Value {
    match tool {
        ToolName::SchemaIntrospect => {
            let tables: Vec<Value> = output
                .get("tables")
                .and_then(Value::as_array)
                .map(|tables| {
                    tables
                        .iter()
                        .map(|t| {
                            json!({
                                "name": t.get("name").cloned().unwrap_or(Value::Null),
                                "columns": column_names(t.get("columns")),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            json!({ "tables": tables })
        }
        ToolName::QueryExecute => json!({
            "success": true,
            "row_count": output.get("row_count").cloned().unwrap_or(Value::Null),
            "columns": column_names(output.get("columns")),
            "artifact_handle": output.get("artifact_handle").cloned().unwrap_or(Value::Null),
        }),
        ToolName::SandboxExecute => {
            let result = output.get("result").and_then(Value::as_str).unwrap_or("");
            json!({
                "success": true,
                "result": truncate_chars(result, COMPACT_RESULT_CHARS),
                "charts": output
                    .get("charts")
                    .and_then(Value::as_array)
                    .map(|c| c.len())
                    .unwrap_or(0),
            })
        }
    }
}

/// Model-facing content for a consumed tool call.
///
/// Failed calls and calls to unknown tools keep their (short) error text.
pub fn compact_record_content(record: &ToolCallRecord) -> String {
    match (record.tool_name(), &record.output) {
        (Some(tool), Some(output)) if record.is_ok() => compact_output(tool, output).to_string(),
        _ => {
            let mut trimmed = record.clone();
            trimmed.error = trimmed
                .error
                .map(|e| truncate_chars(&e, COMPACT_RESULT_CHARS));
            trimmed.to_model_content()
        }
    }
}

/// Column names from either `["a", "b"]` or `[{"name": "a", ...}]`.
fn column_names(columns: Option<&Value>) -> Vec<Value> {
    columns
        .and_then(Value::as_array)
        .map(|cols| {
            cols.iter()
                .filter_map(|c| match c {
                    Value::String(_) => Some(c.clone()),
                    Value::Object(obj) => obj.get("name").cloned(),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
