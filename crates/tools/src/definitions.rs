//! Tool Definitions
//!
//! JSON-schema descriptions of the three tools, as advertised to the
//! reasoning model.

use std::collections::HashMap;

use analytics_agent_core::ToolName;
use analytics_agent_llm::{ParameterSchema, ToolDefinition};

/// Definition for a single tool.
pub fn tool_definition(tool: ToolName) -> ToolDefinition {
    match tool {
        ToolName::SchemaIntrospect => ToolDefinition {
            name: tool.as_str().to_string(),
            description: "List the tables in the analytics database with their column names. \
                Pass `table` to describe a single table."
                .to_string(),
            input_schema: ParameterSchema::object(
                None,
                HashMap::from([(
                    "table".to_string(),
                    ParameterSchema::string(Some("Optional table name to describe")),
                )]),
                vec![],
            ),
        },
        ToolName::QueryExecute => ToolDefinition {
            name: tool.as_str().to_string(),
            description: "Run a read-only SQL query (ClickHouse dialect). Only SELECT-style \
                statements are accepted. The full result is saved as an artifact; you receive \
                the row count, column names and types, a few sample rows, and an \
                `artifact_handle` to pass to sandbox-execute."
                .to_string(),
            input_schema: ParameterSchema::object(
                None,
                HashMap::from([(
                    "sql".to_string(),
                    ParameterSchema::string(Some("A single SELECT statement")),
                )]),
                vec!["sql".to_string()],
            ),
        },
        ToolName::SandboxExecute => ToolDefinition {
            name: tool.as_str().to_string(),
            description: "Run Python analysis code over a query artifact. `df` is preloaded \
                as a pandas DataFrame; pd, np, plt and sns are imported. Assign a markdown \
                string or DataFrame to `result` to return it. Every open matplotlib figure is \
                returned as a chart. No network, no subprocesses, no file access outside the \
                artifact."
                .to_string(),
            input_schema: ParameterSchema::object(
                None,
                HashMap::from([
                    (
                        "code".to_string(),
                        ParameterSchema::string(Some("Python code to execute")),
                    ),
                    (
                        "artifact_handle".to_string(),
                        ParameterSchema::string(Some(
                            "Handle returned by query-execute whose data becomes `df`",
                        )),
                    ),
                ]),
                vec!["code".to_string(), "artifact_handle".to_string()],
            ),
        },
    }
}

/// Definitions for the whole tool set, in a stable order.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    ToolName::ALL.into_iter().map(tool_definition).collect()
}
