//! Request model: parse and validate caller payloads.
//!
//! # Validation order
//! 1. payload parses (JSON, or query string + form body)
//! 2. `method` and `url` present and non-empty
//! 3. defaults applied (timeout, follow-redirects)
//! 4. path parameters substituted into the URL
//!
//! Loop detection runs after step 4 so it always sees the literal target.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use url::form_urlencoded;

use crate::config::schema::TimeoutConfig;
use crate::forward::error::ForwardError;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Timeout policy applied while building an [`OutboundRequest`].
#[derive(Debug, Clone, Copy)]
pub struct RequestDefaults {
    /// Used when the caller sends no timeout, or zero.
    pub default_timeout: Duration,
    /// Caller timeouts above this are clamped down.
    pub max_timeout: Duration,
}

impl RequestDefaults {
    pub fn resolve_timeout(&self, requested_secs: Option<u64>) -> Duration {
        match requested_secs {
            None | Some(0) => self.default_timeout,
            Some(secs) => Duration::from_secs(secs).min(self.max_timeout),
        }
    }
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

impl From<&TimeoutConfig> for RequestDefaults {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            default_timeout: Duration::from_secs(config.default_request_secs),
            max_timeout: Duration::from_secs(config.max_request_secs),
        }
    }
}

/// JSON body of `POST /proxy/request`, as sent by the browser client.
///
/// Every field is optional at this stage so that a missing field surfaces as a
/// validation failure with a precise message rather than a serde error.
#[derive(Debug, Default, Deserialize)]
pub struct RequestPayload {
    pub method: Option<String>,
    pub url: Option<String>,
    pub headers: Option<Vec<String>>,
    pub body: Option<String>,
    pub timeout: Option<u64>,
    #[serde(rename = "followRedirects")]
    pub follow_redirects: Option<bool>,
    pub path_params: Option<HashMap<String, String>>,
    #[serde(rename = "passThrough")]
    pub pass_through: Option<bool>,
    pub streaming: Option<bool>,
}

impl RequestPayload {
    /// Validate required fields, then apply defaults and path parameters.
    pub fn into_request(self, defaults: &RequestDefaults) -> Result<OutboundRequest, ForwardError> {
        let method = self.method.unwrap_or_default();
        if method.is_empty() {
            return Err(ForwardError::RequestFormat("HTTP method is required".into()));
        }

        let url = self.url.unwrap_or_default();
        if url.is_empty() {
            return Err(ForwardError::RequestFormat("URL is required".into()));
        }

        let url = match &self.path_params {
            Some(params) => substitute_path_params(&url, params),
            None => url,
        };

        Ok(OutboundRequest {
            method,
            url,
            headers: parse_header_lines(self.headers.as_deref().unwrap_or_default()),
            body: self.body.map(Bytes::from).unwrap_or_default(),
            timeout: defaults.resolve_timeout(self.timeout),
            follow_redirects: self.follow_redirects.unwrap_or(true),
            pass_through: self.pass_through.unwrap_or(false),
            streaming: self.streaming.unwrap_or(false),
        })
    }
}

/// A validated request ready for the executor. Consumed once, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: String,
    /// Final literal target, path parameters already substituted.
    pub url: String,
    /// Ordered `(name, value)` pairs; blanks dropped, later duplicates win.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub pass_through: bool,
    pub streaming: bool,
}

impl OutboundRequest {
    /// Parse and validate a JSON payload.
    pub fn from_json(payload: &[u8], defaults: &RequestDefaults) -> Result<Self, ForwardError> {
        let payload: RequestPayload = serde_json::from_slice(payload).map_err(|e| {
            ForwardError::RequestFormat(format!("Failed to parse JSON request: {}", e))
        })?;
        payload.into_request(defaults)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Replace every literal `:name` in `url` with the form-encoded value.
///
/// Parameter names may be given with or without their leading colon. Longer
/// names are substituted first so `:id` never clobbers part of `:identifier`.
pub fn substitute_path_params(url: &str, params: &HashMap<String, String>) -> String {
    let mut ordered: Vec<(&str, &str)> = params
        .iter()
        .map(|(name, value)| (name.trim_start_matches(':'), value.as_str()))
        .filter(|(name, _)| !name.is_empty())
        .collect();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

    let mut result = url.to_string();
    for (name, value) in ordered {
        let token = format!(":{}", name);
        if result.contains(&token) {
            let encoded: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
            result = result.replace(&token, &encoded);
        }
    }
    result
}

/// Parse `"Name: Value"` lines. Lines without a colon, or with an empty name or
/// value, are dropped. A repeated name (case-insensitive) keeps its first
/// position but takes the last value.
pub fn parse_header_lines<S: AsRef<str>>(lines: &[S]) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::with_capacity(lines.len());
    for line in lines {
        let Some((name, value)) = line.as_ref().split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() || value.is_empty() {
            continue;
        }
        match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(existing) => existing.1 = value.to_string(),
            None => headers.push((name.to_string(), value.to_string())),
        }
    }
    headers
}

/// Query parameters of `POST /proxy/form`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormQuery {
    pub url: String,
    pub method: String,
    pub timeout: Option<u64>,
    pub follow_redirects: Option<bool>,
    pub content_type: String,
    /// Comma-separated `Name: Value` list.
    pub headers: String,
    /// JSON object of string values.
    pub path_params: String,
    pub pass_through: bool,
    pub streaming: bool,
}

impl FormQuery {
    /// Parse a raw query string. Unparsable numeric or boolean values are
    /// ignored so their defaults apply.
    pub fn parse(query: &str) -> Self {
        let mut parsed = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "url" => parsed.url = value.into_owned(),
                "method" => parsed.method = value.into_owned(),
                "timeout" => parsed.timeout = value.trim().parse().ok(),
                "followRedirects" => parsed.follow_redirects = parse_bool(&value),
                "contentType" => parsed.content_type = value.into_owned(),
                "headers" => parsed.headers = value.into_owned(),
                "path_params" => parsed.path_params = value.into_owned(),
                "passThrough" => parsed.pass_through = parse_bool(&value).unwrap_or(false),
                "streaming" => parsed.streaming = parse_bool(&value).unwrap_or(false),
                _ => {}
            }
        }
        parsed
    }
}

/// Body of `POST /proxy/form`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormBody {
    /// URL-encoded fields; repeated keys already joined with `,`.
    Fields(Vec<(String, String)>),
    /// Opaque multipart payload. Forwarded verbatim with its own Content-Type,
    /// boundary included.
    Multipart { content_type: String, raw: Bytes },
}

impl FormBody {
    /// Classify an inbound body by its Content-Type. Bodies that are neither
    /// multipart nor URL-encoded carry no fields and are not forwarded.
    pub fn from_inbound(content_type: Option<&str>, raw: Bytes) -> Self {
        let lowered = content_type.map(str::to_ascii_lowercase).unwrap_or_default();
        match content_type {
            Some(ct) if lowered.contains("multipart/form-data") => FormBody::Multipart {
                content_type: ct.to_string(),
                raw,
            },
            Some(_) if lowered.contains(FORM_URLENCODED) => FormBody::Fields(collect_form_fields(&raw)),
            _ => FormBody::Fields(Vec::new()),
        }
    }
}

fn collect_form_fields(raw: &[u8]) -> Vec<(String, String)> {
    let mut fields: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in form_urlencoded::parse(raw) {
        match fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value.into_owned()),
            None => fields.push((key.into_owned(), vec![value.into_owned()])),
        }
    }
    fields
        .into_iter()
        .map(|(key, values)| (key, values.join(",")))
        .collect()
}

/// Form-sourced request: query parameters plus a form body.
#[derive(Debug, Clone)]
pub struct FormRequest {
    pub query: FormQuery,
    pub body: FormBody,
}

impl FormRequest {
    pub fn new(query: FormQuery, body: FormBody) -> Self {
        Self { query, body }
    }

    /// Convert into the executor's request shape. Method defaults to `POST`.
    pub fn into_outbound(self, defaults: &RequestDefaults) -> Result<OutboundRequest, ForwardError> {
        let FormRequest { query, body } = self;

        let path_params = if query.path_params.trim().is_empty() {
            None
        } else {
            let params: HashMap<String, String> = serde_json::from_str(&query.path_params)
                .map_err(|e| ForwardError::RequestFormat(format!("Invalid path_params: {}", e)))?;
            Some(params)
        };

        let mut header_lines: Vec<String> = query
            .headers
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect();

        let body = match body {
            FormBody::Multipart { content_type, raw } => {
                header_lines.push(format!("Content-Type: {}", content_type));
                raw
            }
            FormBody::Fields(fields) => {
                if fields.is_empty() && !query.content_type.eq_ignore_ascii_case(FORM_URLENCODED) {
                    Bytes::new()
                } else {
                    let encoded = form_urlencoded::Serializer::new(String::new())
                        .extend_pairs(fields.iter())
                        .finish();
                    header_lines.push(format!("Content-Type: {}", FORM_URLENCODED));
                    Bytes::from(encoded)
                }
            }
        };

        let method = if query.method.is_empty() {
            "POST".to_string()
        } else {
            query.method
        };

        RequestPayload {
            method: Some(method),
            url: Some(query.url),
            headers: Some(header_lines),
            body: None,
            timeout: query.timeout,
            follow_redirects: query.follow_redirects,
            path_params,
            pass_through: Some(query.pass_through),
            streaming: Some(query.streaming),
        }
        .into_request(defaults)
        .map(|request| OutboundRequest { body, ..request })
    }
}

/// Boolean spellings accepted on the query string.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
