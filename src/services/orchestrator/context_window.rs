//! Context Window
//!
//! Rebuilds the reasoning transcript from stored history:
//!
//! - only the last `max_history_turns` user questions (and what followed
//!   each of them) are replayed;
//! - tool results from those runs are compacted;
//! - reasoning text attached to past tool requests is dropped;
//! - whole runs are dropped, oldest first, until the transcript fits in
//!   `max_context_chars`.
//!
//! Tool requests without a stored result get a synthetic failed result so
//! every `tool_use` is answered. Unreadable turns are skipped, except user
//! questions, which are replaced by a fixed note.

use serde_json::json;

use analytics_agent_core::{RequestedToolCall, RunLimits, Turn, TurnContent, TurnRole};
use analytics_agent_llm::{Message, ToolCall};
use analytics_agent_tools::compaction::compact_record_content;

const UNREADABLE_QUESTION: &str = "(this earlier question could not be read back from history)";

fn missing_result_content() -> String {
    json!({
        "success": false,
        "error": "no result was recorded for this call",
    })
    .to_string()
}

/// Messages replayed ahead of the new question.
pub fn build_history(turns: &[Turn], limits: &RunLimits) -> Vec<Message> {
    let runs = split_runs(turns);
    let start = runs.len().saturating_sub(limits.max_history_turns);
    let mut replayed: Vec<Vec<Message>> = runs[start..].iter().map(|run| replay_run(run)).collect();

    let mut total: usize = replayed.iter().map(|run| run_chars(run)).sum();
    let mut dropped = 0;
    while total > limits.max_context_chars && !replayed.is_empty() {
        total -= run_chars(&replayed.remove(0));
        dropped += 1;
    }
    if dropped > 0 {
        tracing::debug!(dropped, "history runs dropped to fit the context budget");
    }

    replayed.into_iter().flatten().collect()
}

/// Group turns into runs, each starting at a user question. Turns before
/// the first question are ignored.
fn split_runs(turns: &[Turn]) -> Vec<&[Turn]> {
    let starts: Vec<usize> = turns
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_user_question())
        .map(|(i, _)| i)
        .collect();
    starts
        .iter()
        .enumerate()
        .map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(turns.len());
            &turns[start..end]
        })
        .collect()
}

fn replay_run(run: &[Turn]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(run.len());
    let mut pending: Vec<String> = Vec::new();

    for turn in run {
        match (&turn.role, &turn.content) {
            (TurnRole::Tool, TurnContent::ToolResult { record }) => {
                let Some(pos) = pending.iter().position(|id| *id == record.id) else {
                    continue;
                };
                pending.remove(pos);
                messages.push(Message::tool_result(
                    &record.id,
                    compact_record_content(record),
                    !record.is_ok(),
                ));
            }
            (_, TurnContent::ToolRequest { calls, .. }) => {
                close_pending(&mut messages, &mut pending);
                let calls: Vec<ToolCall> = calls.iter().map(to_tool_call).collect();
                pending = calls.iter().map(|c| c.id.clone()).collect();
                messages.push(Message::assistant_tool_calls(None, &calls));
            }
            (TurnRole::User, TurnContent::Text { text }) => {
                close_pending(&mut messages, &mut pending);
                messages.push(Message::user(text.clone()));
            }
            (_, TurnContent::Text { text }) => {
                close_pending(&mut messages, &mut pending);
                messages.push(Message::assistant(text.clone()));
            }
            (TurnRole::User, TurnContent::Unreadable { .. }) => {
                close_pending(&mut messages, &mut pending);
                messages.push(Message::user(UNREADABLE_QUESTION));
            }
            (_, TurnContent::ToolResult { .. }) | (_, TurnContent::Unreadable { .. }) => {}
        }
    }
    close_pending(&mut messages, &mut pending);
    messages
}

fn close_pending(messages: &mut Vec<Message>, pending: &mut Vec<String>) {
    for id in pending.drain(..) {
        messages.push(Message::tool_result(id, missing_result_content(), true));
    }
}

fn to_tool_call(call: &RequestedToolCall) -> ToolCall {
    ToolCall::new(call.id.clone(), call.name.clone(), call.arguments.clone())
}

fn run_chars(run: &[Message]) -> usize {
    run.iter().map(Message::char_len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_agent_core::{RunLimitsBuilder, ToolCallRecord};
    use analytics_agent_llm::{MessageContent, MessageRole};

    fn limits(turns: usize, chars: usize) -> RunLimits {
        RunLimitsBuilder::new()
            .max_history_turns(turns)
            .max_context_chars(chars)
            .build()
            .unwrap()
    }

    fn request(id: &str, tool: &str) -> Turn {
        Turn::tool_request(
            Some("let me think about this".into()),
            vec![RequestedToolCall {
                id: id.into(),
                name: tool.into(),
                arguments: json!({"sql": "SELECT 1"}),
            }],
        )
    }

    fn query_result(id: &str) -> Turn {
        Turn::tool_result(ToolCallRecord::succeeded(
            id,
            "query-execute",
            json!({"sql": "SELECT 1"}),
            json!({
                "row_count": 1,
                "columns": [{"name": "x", "type": "UInt8"}],
                "sample_rows": [{"x": 1}],
                "artifact_handle": "art_1",
            }),
        ))
    }

    fn full_run(n: usize) -> Vec<Turn> {
        vec![
            Turn::user(format!("question {}", n)),
            request(&format!("c{}", n), "query-execute"),
            query_result(&format!("c{}", n)),
            Turn::assistant(format!("answer {}", n)),
        ]
    }

    #[test]
    fn test_replays_compacted_runs() {
        let history = full_run(1);
        let messages = build_history(&history, &limits(10, 120_000));
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].text_content(), "question 1");

        // Reasoning text of the tool request is dropped
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content.len(), 1);

        match &messages[2].content[0] {
            MessageContent::ToolResult { tool_use_id, content, is_error } => {
                assert_eq!(tool_use_id, "c1");
                assert!(content.contains("art_1"));
                assert!(!content.contains("sample_rows"));
                assert!(is_error.is_none());
            }
            other => panic!("expected tool result, got {:?}", other),
        }
        assert_eq!(messages[3].text_content(), "answer 1");
    }

    #[test]
    fn test_keeps_last_n_user_turns() {
        let history: Vec<Turn> = (1..=5).flat_map(full_run).collect();
        let messages = build_history(&history, &limits(2, 120_000));
        assert_eq!(messages.len(), 8);
        assert_eq!(messages[0].text_content(), "question 4");
    }

    #[test]
    fn test_char_budget_drops_oldest_runs() {
        let mut history = full_run(1);
        history[0] = Turn::user("q".repeat(2_000));
        history.extend(full_run(2));
        let messages = build_history(&history, &limits(10, 1_000));
        assert_eq!(messages[0].text_content(), "question 2");
    }

    #[test]
    fn test_dangling_request_gets_synthetic_result() {
        let history = vec![Turn::user("q"), request("c1", "schema-introspect")];
        let messages = build_history(&history, &limits(10, 120_000));
        assert_eq!(messages.len(), 3);
        match &messages[2].content[0] {
            MessageContent::ToolResult { tool_use_id, is_error, .. } => {
                assert_eq!(tool_use_id, "c1");
                assert_eq!(*is_error, Some(true));
            }
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[test]
    fn test_orphan_result_is_skipped() {
        let history = vec![Turn::user("q"), query_result("ghost"), Turn::assistant("a")];
        let messages = build_history(&history, &limits(10, 120_000));
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_unreadable_turns_keep_run_structure() {
        let unreadable = |role: TurnRole| Turn {
            role,
            content: TurnContent::Unreadable {
                error: "turn 2 could not be decoded".into(),
            },
            timestamp: chrono::Utc::now(),
        };
        let mut history = full_run(1);
        history[0] = unreadable(TurnRole::User);
        history[2] = unreadable(TurnRole::Tool);

        let messages = build_history(&history, &limits(10, 120_000));
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].text_content(), UNREADABLE_QUESTION);
        match &messages[2].content[0] {
            MessageContent::ToolResult { tool_use_id, is_error, .. } => {
                assert_eq!(tool_use_id, "c1");
                assert_eq!(*is_error, Some(true));
            }
            other => panic!("expected tool result, got {:?}", other),
        }
        assert_eq!(messages[3].text_content(), "answer 1");
    }

    #[test]
    fn test_empty_history() {
        assert!(build_history(&[], &RunLimits::default()).is_empty());
    }
}
