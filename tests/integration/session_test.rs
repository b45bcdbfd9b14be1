//! Session Integration Tests
//!
//! History ordering, identifier uniqueness and per-session serialization
//! of concurrent runs.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::json;

use analytics_agent::commands;
use analytics_agent::AnalyzeRequest;
use analytics_agent_core::{ErrorKind, ToolCallRecord, ToolCallStatus, Turn, TurnContent, TurnRole};
use analytics_agent_llm::ScriptedProvider;

use crate::fixtures::{sandbox_over_last_artifact, test_app, test_app_with};

fn request(query: &str, session_id: &str) -> AnalyzeRequest {
    AnalyzeRequest {
        query: query.to_string(),
        session_id: Some(session_id.to_string()),
    }
}

#[tokio::test]
async fn test_new_sessions_have_distinct_ids() {
    let app = test_app(ScriptedProvider::new()).await;

    let mut ids = HashSet::new();
    for _ in 0..25 {
        let session = commands::new_session(&app.state).await.unwrap();
        assert!(ids.insert(session.session_id));
    }
    assert_eq!(commands::get_chat_stats(&app.state).await.unwrap().sessions, 25);
}

#[tokio::test]
async fn test_history_loads_in_append_order() {
    let app = test_app(ScriptedProvider::new()).await;
    let store = app.state.store();
    let session = store.create().await.unwrap();

    let mut appended = Vec::new();
    for i in 0..30 {
        let turn = match i % 3 {
            0 => Turn::user(format!("question {}", i)),
            1 => Turn::tool_result(
                ToolCallRecord::succeeded(format!("c{}", i), "schema-introspect", json!({}), json!({"tables": []}))
                    .with_duration_ms(1),
            ),
            _ => Turn::assistant(format!("answer {}", i)),
        };
        store.append(&session.id, &turn).await.unwrap();
        appended.push(turn);
    }

    let loaded = store.load(&session.id).await.unwrap();
    assert_eq!(loaded.len(), appended.len());
    for (got, want) in loaded.iter().zip(&appended) {
        assert_eq!(got.role, want.role);
        assert_eq!(got.content, want.content);
    }
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = test_app(ScriptedProvider::new()).await;

    let err = commands::get_session(&app.state, "does-not-exist").await.unwrap_err();
    assert_eq!(err.status_code(), 404);

    let err = commands::close_session(&app.state, "does-not-exist").await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_concurrent_runs_on_one_session_do_not_interleave() {
    let app = test_app(
        ScriptedProvider::new()
            .then_tool("a1", "query-execute", json!({"sql": "SELECT * FROM campaigns"}))
            .then_with(sandbox_over_last_artifact("a2", "import time; time.sleep(1)"))
            .then_text("first answer")
            .then_tool("b1", "schema-introspect", json!({}))
            .then_text("second answer"),
    )
    .await;

    let (a, b) = tokio::join!(
        commands::analyze(&app.state, request("first", "shared")),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            commands::analyze(&app.state, request("second", "shared")).await
        }
    );
    let (a, b) = (a.unwrap().data, b.unwrap().data);
    assert!(a.success && b.success);
    assert_eq!(a.text_output, "first answer");
    assert_eq!(b.text_output, "second answer");

    let turns = app.state.store().load("shared").await.unwrap();
    let roles: Vec<TurnRole> = turns.iter().map(|t| t.role).collect();
    use TurnRole::*;
    assert_eq!(
        roles,
        vec![
            User, Assistant, Tool, Assistant, Tool, Assistant, // first run
            User, Assistant, Tool, Assistant, // second run
        ]
    );
    assert!(matches!(&turns[6].content, TurnContent::Text { text } if text == "second"));
}

#[tokio::test]
async fn test_busy_session_is_rejected_with_valid_body() {
    let app = test_app_with(
        ScriptedProvider::new()
            .then_tool("a1", "query-execute", json!({"sql": "SELECT * FROM campaigns"}))
            .then_with(sandbox_over_last_artifact("a2", "import time; time.sleep(1)"))
            .then_text("done"),
        |config| config.agent.session_lock_wait_secs = 0,
    )
    .await;

    let state = app.state.clone();
    let running = tokio::spawn(async move { commands::analyze(&state, request("slow", "busy")).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let rejected = commands::analyze(&app.state, request("impatient", "busy")).await.unwrap();
    assert_eq!(rejected.status, 409);
    assert!(!rejected.data.success);
    assert_eq!(rejected.data.error_kind, Some(ErrorKind::SessionBusy));
    assert_eq!(rejected.data.session_id, "busy");
    assert!(rejected.data.text_output.is_empty());

    let finished = running.await.unwrap().unwrap().data;
    assert!(finished.success);
    let turns = app.state.store().load("busy").await.unwrap();
    assert_eq!(turns.iter().filter(|t| t.is_user_question()).count(), 1);
}

#[tokio::test]
async fn test_close_waits_for_in_flight_run() {
    let app = test_app(
        ScriptedProvider::new()
            .then_tool("c1", "query-execute", json!({"sql": "SELECT * FROM campaigns"}))
            .then_with(sandbox_over_last_artifact("c2", "import time; time.sleep(1)"))
            .then_with(sandbox_over_last_artifact("c3", "result = df['ctr'].mean()"))
            .then_tool("c4", "query-execute", json!({"sql": "SELECT campaign FROM campaigns"}))
            .then_text("done"),
    )
    .await;

    let state = app.state.clone();
    let running = tokio::spawn(async move { commands::analyze(&state, request("slow", "closing")).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let closed = commands::close_session(&app.state, "closing").await.unwrap();
    assert!(closed.closed);
    assert_eq!(closed.released_artifacts, 2);
    assert!(app.state.artifacts().is_empty());

    let finished = running.await.unwrap().unwrap().data;
    assert!(finished.success);
    assert_eq!(finished.tool_calls.len(), 4);
    assert!(finished.tool_calls.iter().all(|c| c.status == ToolCallStatus::Ok));
}

#[tokio::test]
async fn test_close_of_busy_session_is_rejected() {
    let app = test_app_with(
        ScriptedProvider::new()
            .then_tool("b1", "query-execute", json!({"sql": "SELECT * FROM campaigns"}))
            .then_with(sandbox_over_last_artifact("b2", "import time; time.sleep(1)"))
            .then_text("done"),
        |config| config.agent.session_lock_wait_secs = 0,
    )
    .await;

    let state = app.state.clone();
    let running = tokio::spawn(async move { commands::analyze(&state, request("slow", "held")).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = commands::close_session(&app.state, "held").await.unwrap_err();
    assert_eq!(err.status_code(), 409);

    assert!(running.await.unwrap().unwrap().data.success);
    let info = app.state.store().get("held").await.unwrap().unwrap();
    assert!(info.closed_at.is_none());
    assert_eq!(app.state.artifacts().len(), 1);
}
