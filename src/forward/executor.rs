//! Outbound request execution.
//!
//! # Responsibilities
//! - Validate the target URL (absolute, http/https, has a host)
//! - Build the real request from an [`OutboundRequest`]
//! - Enforce the caller's deadline on connect and on every body read
//! - Apply the redirect policy per call
//! - Map transport failures onto the error taxonomy
//!
//! # Design Decisions
//! - Two long-lived clients, one per redirect policy, share no mutable state;
//!   each call picks one, so concurrent calls never see each other's policy
//! - The deadline is a single `tokio::time::Instant` checked around `send`
//!   and around each `chunk()`, so a slow body cannot outlive the timeout
//! - Failures never escape as `Err`; they become envelopes

use std::error::Error as StdError;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, TRANSFER_ENCODING, USER_AGENT};
use reqwest::{redirect, Client, Method, Response};
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use url::Url;

use crate::config::schema::{TimeoutConfig, UpstreamConfig};
use crate::forward::envelope::{RequestMetrics, ResponseEnvelope, StreamingEnvelope};
use crate::forward::error::ForwardError;
use crate::forward::model::OutboundRequest;
use crate::forward::stream::{is_event_stream, EventStreamRelay};

/// Executor construction failure. Fatal at startup.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid default User-Agent: {0}")]
    UserAgent(#[from] reqwest::header::InvalidHeaderValue),
}

/// Result of a call made with `streaming` requested.
pub enum StreamOutcome {
    /// Upstream is an event stream; relay it.
    Relay(EventStreamRelay),
    /// Upstream answered with an ordinary body, already read and classified.
    Buffered(ResponseEnvelope),
    /// Nothing was relayed; report this instead.
    Failed(StreamingEnvelope),
}

/// The identifying User-Agent sent when the caller supplies none.
pub fn default_user_agent(signature: &str, version: &str) -> String {
    format!("{}/{} (https://requestbite.com/slingshot)", signature, version)
}

/// Accept only absolute http/https URLs with a host.
pub fn validate_url(raw: &str) -> Result<Url, ForwardError> {
    let url = Url::parse(raw)
        .map_err(|e| ForwardError::UrlValidation(format!("Invalid URL format: {}", e)))?;

    if !url.has_host() || url.host_str().is_some_and(str::is_empty) {
        return Err(ForwardError::UrlValidation(
            "Invalid URL format: URL must include a host".to_string(),
        ));
    }

    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ForwardError::UrlValidation(
            "Only HTTP and HTTPS schemes are supported".to_string(),
        )),
    }
}

/// Shared outbound HTTP executor.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    following: Client,
    manual: Client,
    user_agent: HeaderValue,
}

impl RequestExecutor {
    pub fn new(
        upstream: &UpstreamConfig,
        timeouts: &TimeoutConfig,
        user_agent: &str,
    ) -> Result<Self, ExecutorError> {
        let following = build_client(
            upstream,
            timeouts,
            redirect::Policy::limited(upstream.max_redirects),
        )?;
        let manual = build_client(upstream, timeouts, redirect::Policy::none())?;

        Ok(Self {
            following,
            manual,
            user_agent: HeaderValue::from_str(user_agent)?,
        })
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.to_str().unwrap_or_default()
    }

    /// Run a call to completion and describe it as an envelope.
    pub async fn execute(&self, request: &OutboundRequest) -> ResponseEnvelope {
        let deadline = Instant::now() + request.timeout;
        let mut metrics = RequestMetrics::start();

        let result = match self.send(request, deadline, false).await {
            Ok(response) => self.read_to_envelope(request, response, deadline, &mut metrics).await,
            Err(err) => Err(err),
        };
        metrics.finish();

        match result {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!(url = %request.url, error = %err, "Forwarded request failed");
                ResponseEnvelope::failure(&err).with_metrics(&metrics)
            }
        }
    }

    /// Run a call that asked for streaming.
    ///
    /// Event-stream responses are handed back unread for relaying; anything
    /// else is read and classified as in [`execute`](Self::execute).
    pub async fn execute_streaming(&self, request: &OutboundRequest) -> StreamOutcome {
        let deadline = Instant::now() + request.timeout;
        let mut metrics = RequestMetrics::start();

        let response = match self.send(request, deadline, true).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(url = %request.url, error = %err, "Streaming request failed");
                return StreamOutcome::Failed(StreamingEnvelope::failure(&err));
            }
        };

        if is_event_stream(response.headers()) {
            tracing::debug!(url = %request.url, status = response.status().as_u16(), "Relaying event stream");
            return StreamOutcome::Relay(EventStreamRelay::new(response, deadline));
        }

        tracing::debug!(url = %request.url, "Not an event stream, falling back to buffered response");
        let result = self.read_to_envelope(request, response, deadline, &mut metrics).await;
        metrics.finish();

        match result {
            Ok(envelope) => StreamOutcome::Buffered(envelope),
            Err(err) => StreamOutcome::Failed(StreamingEnvelope::failure(&err)),
        }
    }

    async fn read_to_envelope(
        &self,
        request: &OutboundRequest,
        response: Response,
        deadline: Instant,
        metrics: &mut RequestMetrics,
    ) -> Result<ResponseEnvelope, ForwardError> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = read_body(response, deadline, request.timeout, metrics).await?;
        metrics.finish();

        Ok(ResponseEnvelope::from_upstream(
            status,
            &headers,
            body,
            metrics,
            request.pass_through,
        ))
    }

    /// Validate, build and send; returns once response headers arrive.
    async fn send(
        &self,
        request: &OutboundRequest,
        deadline: Instant,
        streaming: bool,
    ) -> Result<Response, ForwardError> {
        let url = validate_url(&request.url)?;
        let builder = self.build(request, url)?;

        let response = match timeout_at(deadline, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Err(transport_error(&err, request.timeout, streaming)),
            Err(_) => return Err(deadline_error(request.timeout, streaming)),
        };

        let status = response.status();
        if !request.follow_redirects && status.is_redirection() {
            return Err(ForwardError::RedirectNotFollowed(status.as_u16()));
        }

        Ok(response)
    }

    fn build(&self, request: &OutboundRequest, url: Url) -> Result<reqwest::RequestBuilder, ForwardError> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            ForwardError::RequestFormat(format!("Invalid HTTP method: {}", request.method))
        })?;

        let mut headers = HeaderMap::with_capacity(request.headers.len() + 2);
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                ForwardError::RequestFormat(format!("Invalid header name: {}", name))
            })?;
            // Framing is derived from the body below.
            if name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
                continue;
            }
            let value = HeaderValue::from_str(value).map_err(|_| {
                ForwardError::RequestFormat(format!("Invalid value for header {}", name))
            })?;
            headers.insert(name, value);
        }

        if !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, self.user_agent.clone());
        }

        let has_body = !request.body.is_empty();
        if has_body && (method == Method::POST || method == Method::PUT || method == Method::PATCH) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(request.body.len()));
        }

        let client = if request.follow_redirects {
            &self.following
        } else {
            &self.manual
        };

        let mut builder = client.request(method, url).headers(headers);
        if has_body {
            builder = builder.body(request.body.clone());
        }
        Ok(builder)
    }
}

fn build_client(
    upstream: &UpstreamConfig,
    timeouts: &TimeoutConfig,
    policy: redirect::Policy,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .redirect(policy)
        .pool_max_idle_per_host(upstream.max_idle_per_host)
        .pool_idle_timeout(Duration::from_secs(timeouts.pool_idle_secs))
        .connect_timeout(Duration::from_secs(timeouts.connect_secs));

    if !upstream.use_system_proxy {
        builder = builder.no_proxy();
    }

    builder.build()
}

/// Read the whole body, one chunk at a time, against the deadline.
async fn read_body(
    mut response: Response,
    deadline: Instant,
    timeout: Duration,
    metrics: &mut RequestMetrics,
) -> Result<Bytes, ForwardError> {
    let mut body = BytesMut::new();
    loop {
        match timeout_at(deadline, response.chunk()).await {
            Ok(Ok(Some(chunk))) => {
                metrics.add_bytes(chunk.len());
                body.extend_from_slice(&chunk);
            }
            Ok(Ok(None)) => return Ok(body.freeze()),
            Ok(Err(err)) if err.is_timeout() => return Err(ForwardError::Timeout(timeout.as_secs())),
            Ok(Err(err)) => {
                return Err(ForwardError::Connection(format!(
                    "Failed to read response: {}",
                    error_chain(&err)
                )))
            }
            Err(_) => return Err(ForwardError::Timeout(timeout.as_secs())),
        }
    }
}

fn deadline_error(timeout: Duration, streaming: bool) -> ForwardError {
    if streaming {
        ForwardError::StreamingTimeout(timeout.as_secs())
    } else {
        ForwardError::Timeout(timeout.as_secs())
    }
}

fn transport_error(err: &reqwest::Error, timeout: Duration, streaming: bool) -> ForwardError {
    if err.is_timeout() {
        deadline_error(timeout, streaming)
    } else if err.is_builder() {
        ForwardError::UrlValidation(format!("Failed to create request: {}", error_chain(err)))
    } else if err.is_connect() || err.is_request() || err.is_redirect() || err.is_body() {
        ForwardError::Connection(format!("Failed to connect to server: {}", error_chain(err)))
    } else {
        ForwardError::Unknown(error_chain(err))
    }
}

/// `outer: inner: root` rendering of an error and its sources.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::error::ErrorKind;

    fn executor() -> RequestExecutor {
        let upstream = UpstreamConfig {
            use_system_proxy: false,
            ..UpstreamConfig::default()
        };
        RequestExecutor::new(
            &upstream,
            &TimeoutConfig::default(),
            &default_user_agent("rb-slingshot", "0.0.0-test"),
        )
        .unwrap()
    }

    fn request(method: &str, url: &str) -> OutboundRequest {
        OutboundRequest {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: Duration::from_secs(5),
            follow_redirects: true,
            pass_through: false,
            streaming: false,
        }
    }

    #[test]
    fn url_validation() {
        assert!(validate_url("https://example.com/a?b=c").is_ok());
        assert!(validate_url("http://127.0.0.1:8080").is_ok());

        let err = validate_url("ftp://example.com/file").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UrlValidation);
        assert_eq!(err.to_string(), "Only HTTP and HTTPS schemes are supported");

        let err = validate_url("not a url").unwrap_err();
        assert!(err.to_string().starts_with("Invalid URL format"));

        assert!(validate_url("mailto:someone@example.com").is_err());
    }

    #[test]
    fn user_agent_carries_signature() {
        let ua = default_user_agent("rb-slingshot", "1.2.3");
        assert_eq!(ua, "rb-slingshot/1.2.3 (https://requestbite.com/slingshot)");
        assert_eq!(executor().user_agent(), "rb-slingshot/0.0.0-test (https://requestbite.com/slingshot)");
    }

    #[test]
    fn chain_skips_repeated_messages() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "root cause");
        assert_eq!(error_chain(&inner), "root cause");
    }

    #[tokio::test]
    async fn bad_scheme_is_reported_without_network() {
        let envelope = executor().execute(&request("GET", "gopher://example.com")).await;
        assert!(!envelope.success);
        assert_eq!(envelope.error_type.as_deref(), Some("url_validation_error"));
        assert_eq!(envelope.error_title.as_deref(), Some("Invalid URL"));
        assert!(envelope.response_time.is_some());
        assert_eq!(envelope.response_size.as_deref(), Some("0 B"));
    }

    #[tokio::test]
    async fn bad_method_is_a_format_error() {
        let envelope = executor().execute(&request("GE T", "http://127.0.0.1:9")).await;
        assert_eq!(envelope.error_type.as_deref(), Some("request_format_error"));
    }

    #[tokio::test]
    async fn refused_connection_is_a_connection_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let envelope = executor()
            .execute(&request("GET", &format!("http://127.0.0.1:{}/", port)))
            .await;
        assert_eq!(envelope.error_type.as_deref(), Some("connection_error"));
        assert!(envelope
            .error_message
            .as_deref()
            .unwrap_or_default()
            .starts_with("Failed to connect to server"));
    }

    #[tokio::test]
    async fn streaming_failure_before_headers_uses_streaming_envelope() {
        match executor()
            .execute_streaming(&request("GET", "file:///etc/passwd"))
            .await
        {
            StreamOutcome::Failed(envelope) => {
                assert!(!envelope.success);
                assert_eq!(envelope.error_type.as_deref(), Some("url_validation_error"));
            }
            _ => panic!("expected a failure"),
        }
    }
}
