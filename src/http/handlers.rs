//! Route handlers.
//!
//! # Responsibilities
//! - `/proxy/request` and `/proxy/form`: parse, loop-gate, execute, render
//! - `/health` and `/`: liveness and welcome text
//! - `/file` and `/dir`: local files, when enabled
//! - Fallback 404 envelope

use std::time::Instant;

use axum::{
    body::Body,
    extract::{RawQuery, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde_json::json;

use crate::files::{self, DirectoryRequest, FileError, FileRequest};
use crate::forward::error::{EnvelopeError, ForwardError};
use crate::forward::executor::StreamOutcome;
use crate::forward::model::{FormBody, FormQuery, FormRequest, OutboundRequest};
use crate::http::request::RequestIdExt;
use crate::http::response;
use crate::http::server::AppState;
use crate::observability::metrics;

const LOOP_MESSAGE: &str = "Request could create an infinite loop to this proxy server";

async fn read_payload(body: Body, limit: usize) -> Result<Bytes, String> {
    axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| e.to_string())
}

/// Record a request that failed before reaching the executor.
fn reject(endpoint: &'static str, started: Instant, err: &ForwardError) -> Response {
    metrics::record_forward(endpoint, err.error_type(), started);
    response::rejected(err)
}

/// `POST /proxy/request`
pub async fn proxy_request(State(state): State<AppState>, headers: HeaderMap, body: Body) -> Response {
    const ENDPOINT: &str = "request";
    let started = Instant::now();

    let payload = match read_payload(body, state.max_body_bytes).await {
        Ok(payload) => payload,
        Err(e) => {
            let err = ForwardError::RequestFormat(format!("Failed to read request body: {}", e));
            return reject(ENDPOINT, started, &err);
        }
    };

    let request = match OutboundRequest::from_json(&payload, &state.defaults) {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(request_id = %headers.request_id(), error = %err, "Rejected proxy request");
            return reject(ENDPOINT, started, &err);
        }
    };

    dispatch(&state, ENDPOINT, &headers, request, started).await
}

/// `POST /proxy/form`
pub async fn proxy_form(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Body,
) -> Response {
    const ENDPOINT: &str = "form";
    let started = Instant::now();

    let query = FormQuery::parse(query.as_deref().unwrap_or_default());

    let raw = match read_payload(body, state.max_body_bytes).await {
        Ok(raw) => raw,
        Err(e) => {
            let err = ForwardError::RequestFormat(format!("Failed to read request body: {}", e));
            return reject(ENDPOINT, started, &err);
        }
    };
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let form = FormRequest::new(query, FormBody::from_inbound(content_type, raw));

    let request = match form.into_outbound(&state.defaults) {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(request_id = %headers.request_id(), error = %err, "Rejected form request");
            return reject(ENDPOINT, started, &err);
        }
    };

    dispatch(&state, ENDPOINT, &headers, request, started).await
}

/// Shared tail of both proxy endpoints: loop gate, then execution.
async fn dispatch(
    state: &AppState,
    endpoint: &'static str,
    headers: &HeaderMap,
    request: OutboundRequest,
    started: Instant,
) -> Response {
    let request_id = headers.request_id();

    let user_agent = headers.user_agent();
    let verdict = state.loop_detector.check(user_agent.as_deref(), &request.url);
    if verdict.is_loop() {
        tracing::warn!(
            request_id = %request_id,
            reason = verdict.reason(),
            url = %request.url,
            "Blocked loop: {}",
            verdict
        );
        metrics::record_loop_blocked(verdict.reason());
        let err = ForwardError::LoopDetected(LOOP_MESSAGE.to_string());
        metrics::record_forward(endpoint, err.error_type(), started);
        return response::loop_detected(&err);
    }

    tracing::info!(
        request_id = %request_id,
        method = %request.method,
        url = %request.url,
        streaming = request.streaming,
        pass_through = request.pass_through,
        "Forwarding request"
    );

    if request.streaming {
        return match state.executor.execute_streaming(&request).await {
            StreamOutcome::Relay(relay) => {
                metrics::record_forward(endpoint, "success", started);
                response::event_stream(relay)
            }
            StreamOutcome::Buffered(envelope) => {
                metrics::record_forward(endpoint, outcome(envelope.error_type.as_deref()), started);
                response::forwarded(envelope)
            }
            StreamOutcome::Failed(envelope) => {
                metrics::record_forward(endpoint, outcome(envelope.error_type.as_deref()), started);
                response::streaming_failure(envelope)
            }
        };
    }

    let envelope = state.executor.execute(&request).await;
    metrics::record_forward(endpoint, outcome(envelope.error_type.as_deref()), started);
    response::forwarded(envelope)
}

fn outcome(error_type: Option<&str>) -> &str {
    error_type.unwrap_or("success")
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "ok",
        "version": &*state.version,
        "user-agent": state.executor.user_agent(),
    }))
    .into_response()
}

/// `GET /`
pub async fn root(State(state): State<AppState>) -> Response {
    let mut text = format!(
        "Welcome to version {} of:\n\n\
         SLINGSHOT PROXY\n\
         ======================================================\n\n\
         The Slingshot Proxy lets a browser make HTTP requests it could not make\n\
         directly, bypassing CORS restrictions, with support for streaming,\n\
         form data and pass-through responses.\n\n\
         Endpoints:\n\
         \x20- POST /proxy/request - Make HTTP requests via JSON\n\
         \x20- POST /proxy/form    - Make HTTP requests via form data\n\
         \x20- GET  /health        - Health check endpoint",
        state.version
    );
    if state.local_files {
        text.push_str(
            "\n - POST /file          - Serve local files (enabled)\
             \n - POST /dir           - List directory contents (enabled)",
        );
    }
    text.push('\n');

    ([(CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response()
}

/// `POST /file`
pub async fn read_file(State(state): State<AppState>, body: Body) -> Response {
    if !state.local_files {
        tracing::warn!("File endpoint accessed but local files are disabled");
        return StatusCode::NOT_FOUND.into_response();
    }

    let request: FileRequest = match parse_file_payload(body, state.max_body_bytes).await {
        Ok(request) => request,
        Err(err) => return response::file_error(&err),
    };

    match files::read_file(request.path.as_deref().unwrap_or_default()).await {
        Ok(content) => response::file_content(content),
        Err(err) => {
            tracing::debug!(error = %err, "File request failed");
            response::file_error(&err)
        }
    }
}

/// `POST /dir`
pub async fn list_dir(State(state): State<AppState>, body: Body) -> Response {
    if !state.local_files {
        tracing::warn!("Directory endpoint accessed but local files are disabled");
        return StatusCode::NOT_FOUND.into_response();
    }

    let request: DirectoryRequest = match parse_file_payload(body, state.max_body_bytes).await {
        Ok(request) => request,
        Err(err) => return response::file_error(&err),
    };

    match files::list_directory(
        request.path.as_deref(),
        request.show_hidden_files.unwrap_or(false),
    )
    .await
    {
        Ok(listing) => Json(listing).into_response(),
        Err(err) => {
            tracing::debug!(error = %err, "Directory request failed");
            response::file_error(&err)
        }
    }
}

async fn parse_file_payload<T: serde::de::DeserializeOwned>(
    body: Body,
    limit: usize,
) -> Result<T, FileError> {
    let payload = read_payload(body, limit).await.map_err(FileError::ReadBody)?;
    serde_json::from_slice(&payload).map_err(|e| FileError::InvalidJson(e.to_string()))
}

/// Any unmatched route.
pub async fn not_found(uri: Uri) -> Response {
    tracing::debug!(path = %uri.path(), "No route matched");
    response::not_found(uri.path())
}
