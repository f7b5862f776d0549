//! Request identification and inbound request helpers.
//!
//! # Responsibilities
//! - Generate a UUID v4 request ID for every inbound request
//! - Expose the ID and the caller's User-Agent to handlers
//!
//! The User-Agent is decoded lossily: a value carrying obs-text bytes still
//! reaches the loop guard.
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - A caller-supplied `x-request-id` is kept, not replaced

use std::borrow::Cow;

use axum::http::{header::USER_AGENT, HeaderMap, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Set on the way in, copied onto the response on the way out.
pub fn request_id_layers() -> (SetRequestIdLayer<MakeRequestUuid>, PropagateRequestIdLayer) {
    (
        SetRequestIdLayer::x_request_id(MakeRequestUuid),
        PropagateRequestIdLayer::x_request_id(),
    )
}

/// Accessors for values handlers read off inbound headers.
pub trait RequestIdExt {
    fn request_id(&self) -> &str;
    fn user_agent(&self) -> Option<Cow<'_, str>>;
}

impl RequestIdExt for HeaderMap {
    fn request_id(&self) -> &str {
        self.get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }

    fn user_agent(&self) -> Option<Cow<'_, str>> {
        self.get(USER_AGENT).map(|v| String::from_utf8_lossy(v.as_bytes()))
    }
}
