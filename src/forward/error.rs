//! Error taxonomy for forwarded requests.
//!
//! Every failure of the *target* request is recovered locally and rendered as
//! a JSON envelope; none of these errors ever reaches the transport layer as a
//! 5xx.

use std::fmt;

use thiserror::Error;

/// Closed set of error kinds visible to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RequestFormat,
    UrlValidation,
    Timeout,
    Connection,
    RedirectNotFollowed,
    LoopDetected,
    StreamingTimeout,
    Unknown,
}

impl ErrorKind {
    /// Machine-readable type string carried in `error_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RequestFormat => "request_format_error",
            ErrorKind::UrlValidation => "url_validation_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection_error",
            ErrorKind::RedirectNotFollowed => "redirect_not_followed",
            ErrorKind::LoopDetected => "loop_detected",
            ErrorKind::StreamingTimeout => "streaming_timeout",
            ErrorKind::Unknown => "unknown_error",
        }
    }

    /// Fixed human title carried in `error_title`.
    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::RequestFormat => "Invalid Request",
            ErrorKind::UrlValidation => "Invalid URL",
            ErrorKind::Timeout => "Request Timed Out",
            ErrorKind::Connection => "Connection Failed",
            ErrorKind::RedirectNotFollowed => "Redirect Not Followed",
            ErrorKind::LoopDetected => "Loop Detected",
            ErrorKind::StreamingTimeout => "Streaming Request Timeout",
            ErrorKind::Unknown => "Request Failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything that can be rendered as the `success=false` branch of an envelope.
pub trait EnvelopeError: fmt::Display {
    fn error_type(&self) -> &'static str;
    fn error_title(&self) -> &'static str;
}

/// Failure of a single forwarded call.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// Payload malformed or a required field missing. Detected before any network call.
    #[error("{0}")]
    RequestFormat(String),

    /// Target URL unparseable, hostless, or not http/https.
    #[error("{0}")]
    UrlValidation(String),

    /// Deadline expired while connecting or reading the body.
    #[error("The server took too long to respond (timeout after {0} seconds).")]
    Timeout(u64),

    /// Any other transport failure (DNS, refused connection, TLS).
    #[error("{0}")]
    Connection(String),

    /// Upstream answered 3xx and the caller opted out of following it.
    #[error("Server returned {0} redirect but following redirects is disabled. Please check your settings.")]
    RedirectNotFollowed(u16),

    #[error("{0}")]
    LoopDetected(String),

    /// Deadline expired before an event-stream response could be established.
    #[error("Streaming request exceeded its deadline of {0} seconds.")]
    StreamingTimeout(u64),

    #[error("{0}")]
    Unknown(String),
}

impl ForwardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForwardError::RequestFormat(_) => ErrorKind::RequestFormat,
            ForwardError::UrlValidation(_) => ErrorKind::UrlValidation,
            ForwardError::Timeout(_) => ErrorKind::Timeout,
            ForwardError::Connection(_) => ErrorKind::Connection,
            ForwardError::RedirectNotFollowed(_) => ErrorKind::RedirectNotFollowed,
            ForwardError::LoopDetected(_) => ErrorKind::LoopDetected,
            ForwardError::StreamingTimeout(_) => ErrorKind::StreamingTimeout,
            ForwardError::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

impl EnvelopeError for ForwardError {
    fn error_type(&self) -> &'static str {
        self.kind().as_str()
    }

    fn error_title(&self) -> &'static str {
        self.kind().title()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_have_stable_wire_names() {
        assert_eq!(ErrorKind::RequestFormat.as_str(), "request_format_error");
        assert_eq!(ErrorKind::StreamingTimeout.as_str(), "streaming_timeout");
        assert_eq!(ErrorKind::Unknown.to_string(), "unknown_error");
    }

    #[test]
    fn error_maps_to_kind_and_title() {
        let err = ForwardError::RedirectNotFollowed(302);
        assert_eq!(err.kind(), ErrorKind::RedirectNotFollowed);
        assert_eq!(err.error_title(), "Redirect Not Followed");
        assert!(err.to_string().contains("302"));
    }
}
