//! System prompt and fixed messages used by the run loop.

use crate::services::analytics_db::TableInfo;
use crate::services::schema::render_for_prompt;

const ROLE: &str = "You are a data analyst working against a ClickHouse analytics database. \
Answer the user's question by inspecting the schema, querying the data and, when useful, \
analysing it with Python and drawing charts.";

const WORKFLOW: &str = "## Workflow
1. Use `schema-introspect` if you are unsure which tables or columns exist.
2. Use `query-execute` with a single read-only SELECT statement (ClickHouse SQL). You get the \
row count, columns, a few sample rows and an `artifact_handle`.
3. Use `sandbox-execute` with that `artifact_handle` to analyse the full result. `df` is the \
result as a pandas DataFrame; `pd`, `np`, `plt` and `sns` are already imported. Assign a string \
or DataFrame to `result` to return it. Every open matplotlib figure is returned as a chart.
4. Reply in markdown. Summarise findings with concrete numbers. Do not paste raw data dumps.

## Rules
- Never attempt to modify data. INSERT, UPDATE, DELETE, DROP, ALTER, TRUNCATE and CREATE are rejected.
- Artifact handles expire; if one is reported expired, run the query again.
- If a tool returns an error, read it, fix the call and try again, or explain the problem.
- Do not call `plt.show()`; figures are collected automatically.";

const SCHEMA_UNAVAILABLE: &str = "The database schema could not be loaded at startup. \
Call `schema-introspect` before writing any query.";

/// Appended to the conversation when the tool budget is spent.
pub const FINAL_ANSWER_REQUEST: &str = "You have reached the limit of tool calls for this \
question. Do not call any more tools. Answer now using only the results you already have, and \
say what is missing.";

/// Build the system prompt. `tables` is `None` when the schema could not
/// be fetched.
pub fn build_system_prompt(tables: Option<&[TableInfo]>, row_limit: u64) -> String {
    let schema = match tables {
        Some(tables) if !tables.is_empty() => format!("## Database schema\n{}", render_for_prompt(tables)),
        Some(_) => "## Database schema\nThe database has no tables.".to_string(),
        None => format!("## Database schema\n{}", SCHEMA_UNAVAILABLE),
    };
    format!(
        "{}\n\n{}\n\nQueries without a LIMIT clause are limited to {} rows.\n\n{}",
        ROLE, schema, row_limit, WORKFLOW
    )
}

/// Notice appended to an answer produced after the iteration bound.
pub fn truncation_notice(max_iterations: u32) -> String {
    format!(
        "\n\n---\n*Analysis stopped after {} reasoning steps; this answer may be incomplete.*",
        max_iterations
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_agent_core::ColumnSchema;

    #[test]
    fn test_prompt_embeds_schema() {
        let tables = vec![TableInfo {
            name: "campaigns".into(),
            columns: vec![ColumnSchema::new("id", "UInt64"), ColumnSchema::new("ctr", "Float64")],
        }];
        let prompt = build_system_prompt(Some(&tables), 50_000);
        assert!(prompt.contains("**campaigns**: id, ctr"));
        assert!(prompt.contains("50000 rows"));
        assert!(!prompt.contains(SCHEMA_UNAVAILABLE));
    }

    #[test]
    fn test_prompt_without_schema_asks_for_introspection() {
        let prompt = build_system_prompt(None, 10);
        assert!(prompt.contains("schema-introspect"));
        assert!(prompt.contains(SCHEMA_UNAVAILABLE));
    }

    #[test]
    fn test_truncation_notice_mentions_limit() {
        assert!(truncation_notice(15).contains("15 reasoning steps"));
    }
}
