//! HTTP Server
//!
//! hyper 1.x HTTP/1 server. One task per connection; requests are routed
//! on `(method, path)` to the handlers in `commands`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use analytics_agent_core::ErrorKind;

use crate::commands;
use crate::models::response::{AnalyzeRequest, ErrorResponse};
use crate::state::AppState;
use crate::utils::error::{AppError, AppResult};

/// Bind the listening socket.
pub async fn bind(addr: SocketAddr) -> AppResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::http(format!("failed to bind {}: {}", addr, e)))
}

/// Accept connections until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> AppResult<()> {
    let bound = listener.local_addr()?;
    tracing::info!(addr = %bound, "listening");

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            },
        };
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(peer = %peer, error = %e, "connection error");
            }
        });
    }
}

/// Route one request. Never fails at the transport level: every error is
/// rendered as a JSON body.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body + Send,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().trim_end_matches('/').to_string();
    tracing::debug!(method = %method, path = %path, "request");

    let resp = match (method, path.as_str()) {
        (Method::OPTIONS, _) => preflight(),
        (Method::GET, "") => json_response(StatusCode::OK, &commands::get_banner(&state)),
        (Method::GET, "/health") => json_response(StatusCode::OK, &commands::get_health(&state).await),
        (Method::GET, "/api/info") => json_response(StatusCode::OK, &commands::get_info(&state)),
        (Method::GET, "/api/chat-stats") => reply(commands::get_chat_stats(&state).await),
        (Method::POST, "/api/session/new") => reply(commands::new_session(&state).await),
        (Method::POST, "/api/analyze") => {
            let limit = state.config().server.max_body_bytes;
            match read_json::<_, AnalyzeRequest>(req.into_body(), limit).await {
                Ok(request) => match commands::analyze(&state, request).await {
                    Ok(resp) => json_response(status(resp.status), &resp.data),
                    Err(e) => error_response(&e),
                },
                Err(e) => error_response(&e),
            }
        }
        (Method::GET, p) => match session_path(p) {
            Some((id, None)) => reply(commands::get_session(&state, id).await),
            _ => not_found(p),
        },
        (Method::POST, p) => match session_path(p) {
            Some((id, Some("close"))) => reply(commands::close_session(&state, id).await),
            _ => not_found(p),
        },
        (_, p) => json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &ErrorResponse::new(ErrorKind::ValidationError, format!("method not allowed on {}", p)),
        ),
    };

    Ok(with_cors(resp))
}

/// `/api/session/{id}` and `/api/session/{id}/{action}`.
fn session_path(path: &str) -> Option<(&str, Option<&str>)> {
    let rest = path.strip_prefix("/api/session/")?;
    let mut parts = rest.splitn(2, '/');
    let id = parts.next().filter(|id| !id.is_empty())?;
    Some((id, parts.next()))
}

async fn read_json<B, T>(body: B, limit: usize) -> AppResult<T>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    T: DeserializeOwned,
{
    let bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(AppError::PayloadTooLarge(limit));
        }
        Err(e) => return Err(AppError::http(format!("failed to read request body: {}", e))),
    };
    serde_json::from_slice(&bytes).map_err(|e| AppError::bad_request(format!("invalid JSON body: {}", e)))
}

fn reply<T: Serialize>(result: AppResult<T>) -> Response<Full<Bytes>> {
    match result {
        Ok(body) => json_response(StatusCode::OK, &body),
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &AppError) -> Response<Full<Bytes>> {
    let code = status(err.status_code());
    if code.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    json_response(code, &ErrorResponse::new(err.kind(), err.to_string()))
}

fn not_found(path: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &ErrorResponse::new(ErrorKind::ValidationError, format!("no route for {}", path)),
    )
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{\"error\":\"serialize\"}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal\"}"))))
}

fn preflight() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(ACCESS_CONTROL_MAX_AGE, "86400")
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn with_cors(mut resp: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let headers = resp.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    resp
}
