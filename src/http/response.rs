//! Turning envelopes into HTTP responses.
//!
//! # Responsibilities
//! - JSON envelopes with status 200, even for failed forwards
//! - 508 for loop blocks, 404 for unknown endpoints
//! - Raw pass-through bodies with the upstream Content-Type
//! - Event-stream relays with the streaming framing headers

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

use crate::files::{FileContent, FileError};
use crate::forward::envelope::{ResponseEnvelope, StreamingEnvelope};
use crate::forward::error::{EnvelopeError, ForwardError};
use crate::forward::stream::EventStreamRelay;

/// Marks a response as preamble line + raw event stream.
pub const X_SLINGSHOT_STREAMING: HeaderName = HeaderName::from_static("x-slingshot-streaming");
const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Request for a path no route serves.
#[derive(Debug)]
pub struct EndpointNotFound(pub String);

impl fmt::Display for EndpointNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint not found: {}", self.0)
    }
}

impl EnvelopeError for EndpointNotFound {
    fn error_type(&self) -> &'static str {
        "endpoint_not_found"
    }

    fn error_title(&self) -> &'static str {
        "Endpoint Not Found"
    }
}

fn json<T: Serialize>(status: StatusCode, value: T) -> Response {
    (status, Json(value)).into_response()
}

/// Envelope for a finished forward; raw bytes when pass-through applies.
///
/// A pass-through response carries the upstream Content-Type, or none at all
/// when the upstream declared none.
pub fn forwarded(envelope: ResponseEnvelope) -> Response {
    if let Some((content_type, body)) = envelope.pass_through_parts() {
        let mut response = Response::new(Body::from(body.clone()));
        if !content_type.is_empty() {
            if let Ok(value) = HeaderValue::from_str(content_type) {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
        }
        return response;
    }
    json(StatusCode::OK, envelope)
}

/// A failure detected before anything was sent upstream.
pub fn rejected<E: EnvelopeError + ?Sized>(err: &E) -> Response {
    json(StatusCode::OK, ResponseEnvelope::failure(err))
}

pub fn loop_detected(err: &ForwardError) -> Response {
    json(StatusCode::LOOP_DETECTED, ResponseEnvelope::failure(err))
}

pub fn not_found(path: &str) -> Response {
    json(
        StatusCode::NOT_FOUND,
        ResponseEnvelope::failure(&EndpointNotFound(path.to_string())),
    )
}

pub fn streaming_failure(envelope: StreamingEnvelope) -> Response {
    json(StatusCode::OK, envelope)
}

/// Preamble plus relayed bytes. Not buffered by this proxy or by nginx.
pub fn event_stream(relay: EventStreamRelay) -> Response {
    let stream = match relay.into_stream() {
        Ok(stream) => stream,
        Err(err) => {
            tracing::error!(error = %err, "Failed to serialize streaming metadata");
            let failure = ForwardError::Unknown(format!("Failed to serialize streaming metadata: {}", err));
            return streaming_failure(StreamingEnvelope::failure(&failure));
        }
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
            (X_SLINGSHOT_STREAMING, "true"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

pub fn file_content(content: FileContent) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content.content_type)],
        content.data,
    )
        .into_response()
}

/// Not-found is a 400; every other file failure rides on a 200.
pub fn file_error(err: &FileError) -> Response {
    let status = if err.is_not_found() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    json(status, ResponseEnvelope::failure(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn failed_forward_is_a_200_envelope() {
        let response = rejected(&ForwardError::RequestFormat("URL is required".into()));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["cancelled"], false);
        assert_eq!(body["error_type"], "request_format_error");
        assert!(body.get("response_status").is_none());
    }

    #[tokio::test]
    async fn loop_block_is_508() {
        let response = loop_detected(&ForwardError::LoopDetected("loop".into()));
        assert_eq!(response.status(), StatusCode::LOOP_DETECTED);
        assert_eq!(body_json(response).await["error_type"], "loop_detected");
    }

    #[tokio::test]
    async fn unknown_endpoint_is_404_envelope() {
        let response = not_found("/nope");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error_type"], "endpoint_not_found");
        assert_eq!(body["error_message"], "Endpoint not found: /nope");
    }

    #[tokio::test]
    async fn pass_through_writes_raw_bytes() {
        let envelope = ResponseEnvelope {
            success: true,
            content_type: Some("image/png".into()),
            raw_body: Some(Bytes::from_static(b"\x89PNG")),
            ..ResponseEnvelope::default()
        };
        let response = forwarded(envelope);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"\x89PNG");
    }

    #[tokio::test]
    async fn pass_through_without_content_type_adds_none() {
        let envelope = ResponseEnvelope {
            success: true,
            content_type: Some(String::new()),
            raw_body: Some(Bytes::from_static(b"opaque")),
            ..ResponseEnvelope::default()
        };
        let response = forwarded(envelope);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"opaque");
    }
}
