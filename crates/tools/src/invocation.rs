//! Tool Invocations
//!
//! Turns a raw `(name, arguments)` pair from the reasoning model into a
//! typed, validated invocation. Nothing is dispatched unless this succeeds.

use serde_json::{Map, Value};

use analytics_agent_core::{CoreError, CoreResult, ToolName};

/// Longest accepted SQL statement.
pub const MAX_SQL_CHARS: usize = 100_000;
/// Longest accepted analysis program.
pub const MAX_CODE_CHARS: usize = 50_000;

/// A validated request for one of the three tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    SchemaIntrospect { table: Option<String> },
    QueryExecute { sql: String },
    SandboxExecute { code: String, artifact_handle: String },
}

impl ToolInvocation {
    /// Validate a tool request.
    ///
    /// Unknown tool names, missing or mistyped arguments, and oversized
    /// inputs are all `Validation` errors.
    pub fn parse(name: &str, arguments: &Value) -> CoreResult<Self> {
        let tool = ToolName::parse(name).ok_or_else(|| {
            CoreError::validation(format!(
                "Unknown tool '{}'. Available tools: {}",
                name,
                ToolName::ALL.map(|t| t.as_str()).join(", ")
            ))
        })?;
        let args = coerce_arguments(arguments)?;

        match tool {
            ToolName::SchemaIntrospect => Ok(ToolInvocation::SchemaIntrospect {
                table: optional_string(&args, &["table", "table_name"])?,
            }),
            ToolName::QueryExecute => {
                let sql = required_string(&args, &["sql", "query"], tool)?;
                if sql.chars().count() > MAX_SQL_CHARS {
                    return Err(CoreError::validation(format!(
                        "sql exceeds {} characters",
                        MAX_SQL_CHARS
                    )));
                }
                Ok(ToolInvocation::QueryExecute { sql })
            }
            ToolName::SandboxExecute => {
                let code = required_string(&args, &["code"], tool)?;
                if code.chars().count() > MAX_CODE_CHARS {
                    return Err(CoreError::validation(format!(
                        "code exceeds {} characters",
                        MAX_CODE_CHARS
                    )));
                }
                let artifact_handle =
                    required_string(&args, &["artifact_handle", "artifact", "handle"], tool)?;
                Ok(ToolInvocation::SandboxExecute {
                    code,
                    artifact_handle,
                })
            }
        }
    }

    pub fn tool(&self) -> ToolName {
        match self {
            ToolInvocation::SchemaIntrospect { .. } => ToolName::SchemaIntrospect,
            ToolInvocation::QueryExecute { .. } => ToolName::QueryExecute,
            ToolInvocation::SandboxExecute { .. } => ToolName::SandboxExecute,
        }
    }
}

/// Arguments must be an object. Some models send the object JSON-encoded
/// as a string, or send `null` for no arguments.
fn coerce_arguments(arguments: &Value) -> CoreResult<Map<String, Value>> {
    match arguments {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(CoreError::validation(
                "tool arguments must be a JSON object",
            )),
        },
        _ => Err(CoreError::validation("tool arguments must be a JSON object")),
    }
}

fn lookup<'a>(args: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| args.get(*k))
        .find(|v| !v.is_null())
}

fn optional_string(args: &Map<String, Value>, keys: &[&str]) -> CoreResult<Option<String>> {
    match lookup(args, keys) {
        None => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(CoreError::validation(format!("'{}' must be a string", keys[0]))),
    }
}

fn required_string(args: &Map<String, Value>, keys: &[&str], tool: ToolName) -> CoreResult<String> {
    optional_string(args, keys)?.ok_or_else(|| {
        CoreError::validation(format!("{} requires a non-empty '{}'", tool, keys[0]))
    })
}
