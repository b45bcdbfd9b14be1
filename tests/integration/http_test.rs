//! HTTP Integration Tests
//!
//! Requests go through `server::handle_request`, the same entry point the
//! listener uses, with in-memory bodies.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use serde_json::{json, Value};

use analytics_agent::server::handle_request;
use analytics_agent_llm::ScriptedProvider;

use crate::fixtures::{test_app, test_app_with, TestApp};

async fn call(app: &TestApp, method: Method, path: &str, body: Option<&str>) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.unwrap_or("").to_string())))
        .unwrap();
    let resp = handle_request(req, app.state.clone()).await.unwrap();
    let status = resp.status();
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_banner_health_and_info() {
    let app = test_app(ScriptedProvider::new()).await;

    let (status, banner) = call(&app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(banner["status"], "online");

    let (status, health) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["database"], true);

    let (_, info) = call(&app, Method::GET, "/api/info", None).await;
    assert_eq!(info["database"], "fixture:8443/default");
    assert_eq!(
        info["tools"],
        json!(["schema-introspect", "query-execute", "sandbox-execute"])
    );
    assert_eq!(info["limits"]["row_limit"], 50_000);
    assert_eq!(info["sandbox"]["analysis_stack"], true);
}

#[tokio::test]
async fn test_session_endpoints() {
    let app = test_app(ScriptedProvider::new()).await;

    let (status, created) = call(&app, Method::POST, "/api/session/new", None).await;
    assert_eq!(status, StatusCode::OK);
    let id = created["session_id"].as_str().unwrap().to_string();

    let (status, details) = call(&app, Method::GET, &format!("/api/session/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["total_turns"], 0);
    assert_eq!(details["has_history"], false);

    let (status, closed) = call(&app, Method::POST, &format!("/api/session/{}/close", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["closed"], true);

    let (status, missing) = call(&app, Method::GET, "/api/session/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(missing["error_kind"], "session_not_found");

    let (status, stats) = call(&app, Method::GET, "/api/chat-stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["sessions"], 1);
}

#[tokio::test]
async fn test_analyze_over_http() {
    let app = test_app(
        ScriptedProvider::new()
            .then_tool("c1", "schema-introspect", json!({}))
            .then_text("One table: campaigns."),
    )
    .await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/analyze",
        Some(r#"{"query": "what tables exist?", "session_id": "http-1"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["session_id"], "http-1");
    assert_eq!(body["text_output"], "One table: campaigns.");
    assert_eq!(body["tool_calls"][0]["tool"], "schema-introspect");
    assert_eq!(body["plots"], json!([]));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_analyze_failures_keep_status_200() {
    let app = test_app(ScriptedProvider::new()).await;

    // Exhausted script: the reasoning model is unavailable.
    let (status, body) = call(&app, Method::POST, "/api/analyze", Some(r#"{"query": "hi"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_kind"], "reasoning_unavailable");
    assert_eq!(body["text_output"], "");
}

#[tokio::test]
async fn test_bad_requests() {
    let app = test_app_with(ScriptedProvider::new(), |config| config.server.max_body_bytes = 256).await;

    let (status, body) = call(&app, Method::POST, "/api/analyze", Some("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_kind"], "validation_error");

    let (status, _) = call(&app, Method::POST, "/api/analyze", Some(r#"{"query": "  "}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::POST, "/api/analyze", Some(r#"{"session_id": "x"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let huge = format!(r#"{{"query": "{}"}}"#, "x".repeat(1024));
    let (status, _) = call(&app, Method::POST, "/api/analyze", Some(&huge)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let (status, _) = call(&app, Method::GET, "/api/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::DELETE, "/api/session/new", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, body) = call(&app, Method::OPTIONS, "/api/analyze", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
}
