//! Analyze Flow Integration Tests
//!
//! Drives `commands::analyze` end to end:
//! - schema questions answered after one introspection call
//! - query then chart, returned as data-URI PNGs
//! - follow-up questions replay the session and reuse artifacts
//! - mutating SQL is rejected before reaching the database
//! - sandbox limit breaches stay inside the tool-call log

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use serde_json::json;

use analytics_agent::commands;
use analytics_agent::AnalyzeRequest;
use analytics_agent_core::{ErrorKind, ToolCallStatus};
use analytics_agent_llm::{LlmError, LlmResponse, ScriptedProvider, ToolCall};

use crate::fixtures::{latest_artifact_handle, sandbox_over_last_artifact, test_app};

fn request(query: &str, session_id: Option<&str>) -> AnalyzeRequest {
    AnalyzeRequest {
        query: query.to_string(),
        session_id: session_id.map(str::to_string),
    }
}

fn decode_plot(uri: &str) -> image::DynamicImage {
    let encoded = uri
        .strip_prefix("data:image/png;base64,")
        .expect("plot should be a PNG data URI");
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .unwrap();
    image::load_from_memory_with_format(&bytes, image::ImageFormat::Png).unwrap()
}

#[tokio::test]
async fn test_schema_question_uses_one_introspection_call() {
    let app = test_app(
        ScriptedProvider::new()
            .then_tool("c1", "schema-introspect", json!({}))
            .then_text("The database has one table, `campaigns`, with campaign, week and ctr."),
    )
    .await;
    let session = commands::new_session(&app.state).await.unwrap();

    let resp = commands::analyze(&app.state, request("what tables exist?", Some(&session.session_id)))
        .await
        .unwrap();

    assert_eq!(resp.status, 200);
    let body = resp.data;
    assert!(body.success);
    assert_eq!(body.session_id, session.session_id);
    assert_eq!(body.tool_calls.len(), 1);
    assert_eq!(body.tool_calls[0].tool, "schema-introspect");
    assert!(!body.text_output.is_empty());
    assert!(body.error.is_none());

    // The schema was in the system prompt from startup.
    let system = app.provider.requests()[0].system.clone().unwrap_or_default();
    assert!(system.contains("campaigns"));
}

#[tokio::test]
async fn test_chart_request_then_follow_up() {
    let app = test_app(
        ScriptedProvider::new()
            .then_tool("c1", "query-execute", json!({"sql": "SELECT campaign, ctr FROM campaigns"}))
            .then_with(sandbox_over_last_artifact("c2", "df.plot.bar(x='campaign', y='ctr')"))
            .then_text("Spring has the highest CTR.")
            // follow-up run
            .then_with(sandbox_over_last_artifact("c3", "df.groupby('week').ctr.mean().plot()"))
            .then_text("Weekly CTR is declining."),
    )
    .await;
    let session = commands::new_session(&app.state).await.unwrap();
    let sid = session.session_id.as_str();

    let first = commands::analyze(&app.state, request("show CTR by campaign as a bar chart", Some(sid)))
        .await
        .unwrap()
        .data;
    assert!(first.success, "{:?}", first.error);
    let tools: Vec<&str> = first.tool_calls.iter().map(|c| c.tool.as_str()).collect();
    assert_eq!(tools, vec!["query-execute", "sandbox-execute"]);
    assert!(!first.plots.is_empty());
    for plot in &first.plots {
        let img = decode_plot(plot);
        assert_eq!((img.width(), img.height()), (8, 6));
    }
    let after_first = commands::get_session(&app.state, sid).await.unwrap().total_turns;

    let second = commands::analyze(&app.state, request("now show it weekly", Some(sid)))
        .await
        .unwrap()
        .data;
    assert!(second.success, "{:?}", second.error);
    assert_eq!(second.session_id, sid);
    // The follow-up reused the first run's artifact instead of querying again.
    assert_eq!(second.tool_calls.len(), 1);
    assert_eq!(second.tool_calls[0].tool, "sandbox-execute");
    assert_eq!(second.tool_calls[0].status, ToolCallStatus::Ok);
    assert_eq!(app.db.executed().len(), 1);

    let details = commands::get_session(&app.state, sid).await.unwrap();
    assert!(details.total_turns >= after_first + 2);
    assert_eq!(details.user_turns, 2);

    // The first question was replayed to the model on the second run.
    let follow_up_request = &app.provider.requests()[3];
    assert!(format!("{:?}", follow_up_request.messages).contains("show CTR by campaign"));
}

#[tokio::test]
async fn test_drop_table_is_rejected_without_touching_the_database() {
    let app = test_app(
        ScriptedProvider::new()
            .then_tool("c1", "query-execute", json!({"sql": "DROP TABLE campaigns"}))
            .then_text("I can only run read-only queries, so the table was not dropped."),
    )
    .await;

    let body = commands::analyze(&app.state, request("DROP TABLE campaigns", Some("s-drop")))
        .await
        .unwrap()
        .data;

    assert!(body.success);
    assert_eq!(body.tool_calls.len(), 1);
    let call = &body.tool_calls[0];
    assert_eq!(call.status, ToolCallStatus::Failed);
    assert_eq!(call.error_kind, Some(ErrorKind::QueryRejected));
    assert!(app.db.executed().is_empty());
    assert_eq!(app.db.row_count(), 3);
}

#[tokio::test]
async fn test_runaway_sandbox_code_is_a_tool_error() {
    let app = test_app(
        ScriptedProvider::new()
            .then_tool("c1", "query-execute", json!({"sql": "SELECT * FROM campaigns"}))
            .then_with(sandbox_over_last_artifact("c2", "while True:\n    pass"))
            .then_with(sandbox_over_last_artifact("c3", "x = bytearray(10**12)"))
            .then_text("The analysis could not be completed within the sandbox limits."),
    )
    .await;

    let body = tokio::time::timeout(
        Duration::from_secs(10),
        commands::analyze(&app.state, request("loop forever please", None)),
    )
    .await
    .expect("run should finish within its bounds")
    .unwrap()
    .data;

    assert!(body.success);
    assert!(body.error.is_none());
    let sandbox_errors: Vec<_> = body
        .tool_calls
        .iter()
        .filter(|c| c.error_kind == Some(ErrorKind::SandboxError))
        .collect();
    assert_eq!(sandbox_errors.len(), 2);
    assert!(sandbox_errors[0].error.as_deref().unwrap_or("").contains("wall-clock"));
    assert!(body.plots.is_empty());
}

#[tokio::test]
async fn test_reasoning_failure_keeps_audit_log() {
    let app = test_app(
        ScriptedProvider::new()
            .then_tool("c1", "schema-introspect", json!({}))
            .then_error(LlmError::AuthenticationFailed {
                message: "invalid key".into(),
            }),
    )
    .await;

    let body = commands::analyze(&app.state, request("what tables exist?", Some("s-fail")))
        .await
        .unwrap()
        .data;

    assert!(!body.success);
    assert_eq!(body.error_kind, Some(ErrorKind::ReasoningUnavailable));
    assert!(body.error.is_some());
    assert!(body.text_output.is_empty());
    assert_eq!(body.tool_calls.len(), 1);
    assert_eq!(body.tool_calls[0].status, ToolCallStatus::Ok);
}

#[tokio::test]
async fn test_missing_session_id_creates_one() {
    let app = test_app(ScriptedProvider::new().then_text("Hello.")).await;

    let body = commands::analyze(&app.state, request("hi", None)).await.unwrap().data;

    assert!(body.success);
    assert!(uuid::Uuid::parse_str(&body.session_id).is_ok());
    let details = commands::get_session(&app.state, &body.session_id).await.unwrap();
    assert_eq!(details.user_turns, 1);
}

#[tokio::test]
async fn test_empty_query_is_a_bad_request() {
    let app = test_app(ScriptedProvider::new()).await;

    let err = commands::analyze(&app.state, request("   ", None)).await.unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert_eq!(app.provider.request_count(), 0);
}

#[tokio::test]
async fn test_closing_session_releases_its_artifacts() {
    let app = test_app(
        ScriptedProvider::new()
            .then_tool("c1", "query-execute", json!({"sql": "SELECT * FROM campaigns"}))
            .then_text("Three campaigns."),
    )
    .await;

    let body = commands::analyze(&app.state, request("how many campaigns?", Some("owner")))
        .await
        .unwrap()
        .data;
    assert!(body.success);
    assert_eq!(app.state.artifacts().len(), 1);

    let closed = commands::close_session(&app.state, "owner").await.unwrap();
    assert!(closed.closed);
    assert_eq!(closed.released_artifacts, 1);
    assert!(app.state.artifacts().is_empty());
}

#[tokio::test]
async fn test_foreign_artifact_handle_is_refused() {
    let captured = Arc::new(Mutex::new(String::new()));
    let (store, replay) = (captured.clone(), captured.clone());
    let app = test_app(
        ScriptedProvider::new()
            .then_tool("c1", "query-execute", json!({"sql": "SELECT * FROM campaigns"}))
            .then_with(move |messages| {
                *store.lock().unwrap() = latest_artifact_handle(messages);
                Ok(LlmResponse::text("Queried."))
            })
            .then_with(move |_| {
                let handle = replay.lock().unwrap().clone();
                Ok(LlmResponse::with_tool_calls(vec![ToolCall::new(
                    "c2",
                    "sandbox-execute",
                    json!({"code": "df.describe()", "artifact_handle": handle}),
                )]))
            })
            .then_text("That data is not available in this session."),
    )
    .await;

    let first = commands::analyze(&app.state, request("query", Some("alice")))
        .await
        .unwrap()
        .data;
    assert!(first.success);
    assert!(captured.lock().unwrap().starts_with("art_"));

    let second = commands::analyze(&app.state, request("analyze alice's data", Some("bob")))
        .await
        .unwrap()
        .data;
    assert!(second.success);
    assert_eq!(second.tool_calls[0].status, ToolCallStatus::Failed);
    assert_eq!(second.tool_calls[0].error_kind, Some(ErrorKind::ValidationError));
    assert_eq!(app.sandbox.runs.load(Ordering::SeqCst), 0);
}
