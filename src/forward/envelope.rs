//! Response envelopes returned to the browser client.
//!
//! Exactly one of the success or failure field groups is populated.
//! `cancelled` is always serialised and is always `false`: there is no
//! caller-initiated cancellation channel.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde::Serialize;

use crate::forward::classify::{classify, collect_headers, content_type, is_binary_content};
use crate::forward::error::EnvelopeError;

/// Normalised result of one forwarded call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_binary: Option<bool>,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Upstream bytes, kept only for pass-through delivery.
    #[serde(skip)]
    pub raw_body: Option<Bytes>,
}

impl ResponseEnvelope {
    /// Classify a fully-read upstream response.
    pub fn from_upstream(
        status: u16,
        headers: &HeaderMap,
        body: Bytes,
        metrics: &RequestMetrics,
        keep_raw: bool,
    ) -> Self {
        let content_type = content_type(headers);
        let classification = classify(&content_type, &body);

        Self {
            success: true,
            response_status: Some(status),
            response_headers: Some(collect_headers(headers)),
            response_data: Some(classification.encoded_body),
            response_size: Some(metrics.format_size()),
            response_time: Some(metrics.format_duration()),
            content_type: Some(content_type),
            is_binary: Some(classification.is_binary),
            cancelled: false,
            raw_body: keep_raw.then_some(body),
            ..Self::default()
        }
    }

    pub fn failure<E: EnvelopeError + ?Sized>(err: &E) -> Self {
        Self {
            success: false,
            error_type: Some(err.error_type().to_string()),
            error_title: Some(err.error_title().to_string()),
            error_message: Some(err.to_string()),
            ..Self::default()
        }
    }

    /// Attach size and duration, e.g. to a failure after the deadline fired.
    pub fn with_metrics(mut self, metrics: &RequestMetrics) -> Self {
        self.response_size = Some(metrics.format_size());
        self.response_time = Some(metrics.format_duration());
        self
    }

    /// Raw upstream body and Content-Type, when this envelope can be delivered
    /// as pass-through. Failures never qualify.
    pub fn pass_through_parts(&self) -> Option<(&str, &Bytes)> {
        if !self.success {
            return None;
        }
        let body = self.raw_body.as_ref()?;
        Some((self.content_type.as_deref().unwrap_or_default(), body))
    }
}

/// Preamble line sent before relayed event-stream bytes. Body, size and time
/// are unknowable until the stream ends, so they are absent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamingEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_binary: Option<bool>,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StreamingEnvelope {
    pub fn from_upstream(status: u16, headers: &HeaderMap) -> Self {
        let content_type = content_type(headers);
        Self {
            success: true,
            response_status: Some(status),
            response_headers: Some(collect_headers(headers)),
            is_binary: Some(is_binary_content(&content_type)),
            content_type: Some(content_type),
            cancelled: false,
            ..Self::default()
        }
    }

    pub fn failure<E: EnvelopeError + ?Sized>(err: &E) -> Self {
        Self {
            success: false,
            error_type: Some(err.error_type().to_string()),
            error_title: Some(err.error_title().to_string()),
            error_message: Some(err.to_string()),
            ..Self::default()
        }
    }
}

/// Timing and size of one forwarded call.
#[derive(Debug, Clone, Copy)]
pub struct RequestMetrics {
    started: Instant,
    finished: Option<Instant>,
    bytes: u64,
}

impl RequestMetrics {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            finished: None,
            bytes: 0,
        }
    }

    pub fn add_bytes(&mut self, n: usize) {
        self.bytes = self.bytes.saturating_add(n as u64);
    }

    pub fn finish(&mut self) {
        self.finished.get_or_insert_with(Instant::now);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn elapsed(&self) -> Duration {
        self.finished.unwrap_or_else(Instant::now).duration_since(self.started)
    }

    pub fn format_duration(&self) -> String {
        format_duration(self.elapsed())
    }

    pub fn format_size(&self) -> String {
        format_size(self.bytes)
    }
}

/// Milliseconds with two decimals, e.g. `12.34 ms`.
pub fn format_duration(elapsed: Duration) -> String {
    format!("{:.2} ms", elapsed.as_secs_f64() * 1000.0)
}

/// `B` below 1 KiB, `KB` below 1 MiB, `MB` above.
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}
