//! Shared utilities for integration tests.
//!
//! Mock upstreams are small axum apps on ephemeral ports; the proxy under
//! test is the real `HttpServer` on another ephemeral port.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use futures_util::stream;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use slingshot_proxy::{HttpServer, ProxyConfig, Shutdown};

/// Events emitted by the `/sse` route, in order.
pub const SSE_EVENTS: [&str; 3] = [
    "data: {\"n\":1}\n\n",
    "event: tick\ndata: two\n\n",
    "data: done\n\n",
];

pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0xff];

#[derive(Clone, Default)]
pub struct Upstream {
    pub addr: Option<SocketAddr>,
    /// Requests that reached the upstream.
    pub hits: Arc<AtomicUsize>,
}

impl Upstream {
    pub fn url(&self, path: &str) -> String {
        let addr = self.addr.expect("upstream not started");
        format!("http://{}{}", addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Start the mock upstream with every test route.
pub async fn start_upstream() -> Upstream {
    let hits = Arc::new(AtomicUsize::new(0));

    let app = Router::new()
        .route("/status/{code}", get(status))
        .route("/health", get(|| async { "upstream healthy" }))
        .route("/redirect", get(redirect))
        .route("/final", get(|| async { "arrived" }))
        .route("/slow", get(slow))
        .route("/png", get(png))
        .route("/json", get(|| async { Json(json!({"hello": "world"})) }))
        .route("/sse", get(sse))
        .route("/sse-fixed", get(sse_fixed))
        .route("/sse-stall", get(sse_stall))
        .route("/echo", any(echo))
        .layer(axum::middleware::from_fn_with_state(hits.clone(), count_hits));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Upstream {
        addr: Some(addr),
        hits,
    }
}

async fn count_hits(
    State(hits): State<Arc<AtomicUsize>>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    next.run(request).await
}

async fn status(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, format!("status {}", code)).into_response()
}

async fn redirect() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/final")]).into_response()
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(3)).await;
    "finally"
}

async fn png() -> Response {
    ([(header::CONTENT_TYPE, "image/png")], PNG_BYTES).into_response()
}

fn event_stream_response(body: Body) -> Response {
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn sse() -> Response {
    let events = stream::unfold(0usize, |i| async move {
        if i >= SSE_EVENTS.len() {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        Some((Ok::<_, Infallible>(Bytes::from_static(SSE_EVENTS[i].as_bytes())), i + 1))
    });
    event_stream_response(Body::from_stream(events))
}

async fn sse_fixed() -> Response {
    // Known length: served with Content-Length, so not relayed.
    event_stream_response(Body::from("data: fixed\n\n"))
}

async fn sse_stall() -> Response {
    let events = stream::unfold(0usize, |i| async move {
        if i > 0 {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Some((Ok::<_, Infallible>(Bytes::from_static(b"data: first\n\n")), i + 1))
    });
    event_stream_response(Body::from_stream(events))
}

async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let custom: serde_json::Map<String, Value> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-"))
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();

    Json(json!({
        "method": method.as_str(),
        "content_type": header("content-type"),
        "content_length": header("content-length"),
        "user_agent": header("user-agent"),
        "custom": custom,
        "body": String::from_utf8_lossy(&body),
    }))
}

/// A running proxy instance.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a proxy with test defaults, then let `configure` adjust them.
pub async fn start_proxy_with(configure: impl FnOnce(&mut ProxyConfig)) -> TestProxy {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upstream.use_system_proxy = false;
    configure(&mut config);

    let server = HttpServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, server_shutdown).await.unwrap();
    });

    TestProxy { addr, shutdown }
}

pub async fn start_proxy() -> TestProxy {
    start_proxy_with(|_| {}).await
}

/// A client that never goes through a system proxy and sends no User-Agent.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// POST a JSON payload to `/proxy/request`.
pub async fn forward(proxy: &TestProxy, payload: Value) -> reqwest::Response {
    client()
        .post(proxy.url("/proxy/request"))
        .json(&payload)
        .send()
        .await
        .unwrap()
}

/// POST to `/proxy/request` and decode the JSON envelope.
pub async fn forward_json(proxy: &TestProxy, payload: Value) -> Value {
    let response = forward(proxy, payload).await;
    assert_eq!(response.status(), 200);
    response.json().await.unwrap()
}

/// Milliseconds from a `"12.34 ms"` duration string.
pub fn parse_ms(value: &Value) -> f64 {
    value
        .as_str()
        .and_then(|s| s.strip_suffix(" ms"))
        .and_then(|s| s.parse().ok())
        .expect("duration string")
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
