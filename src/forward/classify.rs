//! Response classification.
//!
//! Binary detection trusts the upstream's declared Content-Type; the body is
//! never sniffed.

use std::collections::BTreeMap;

use base64::{engine::general_purpose, Engine as _};
use reqwest::header::HeaderMap;

/// Content-Type fragments that mark a body as binary.
const BINARY_TYPES: &[&str] = &[
    "image/",
    "video/",
    "audio/",
    "application/pdf",
    "application/zip",
    "application/octet-stream",
    "application/msword",
    "application/vnd.",
    "application/x-",
    "font/",
];

/// Outcome of classifying one body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub is_binary: bool,
    /// Literal text, or standard base64 when `is_binary`.
    pub encoded_body: String,
}

pub fn is_binary_content(content_type: &str) -> bool {
    if content_type.is_empty() {
        return false;
    }
    let lowered = content_type.to_ascii_lowercase();
    BINARY_TYPES.iter().any(|fragment| lowered.contains(fragment))
}

/// Decide how `body` travels inside a JSON envelope.
pub fn classify(content_type: &str, body: &[u8]) -> Classification {
    if is_binary_content(content_type) {
        Classification {
            is_binary: true,
            encoded_body: general_purpose::STANDARD.encode(body),
        }
    } else {
        Classification {
            is_binary: false,
            encoded_body: String::from_utf8_lossy(body).into_owned(),
        }
    }
}

/// Lower-cased header names with the first value for each name.
pub fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .filter_map(|name| {
            headers.get(name).map(|value| {
                (
                    name.as_str().to_ascii_lowercase(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
        })
        .collect()
}

/// The declared Content-Type, or an empty string.
pub fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(reqwest::header::CONTENT_TYPE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default()
}
