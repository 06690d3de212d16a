//! Response types: headers, raw responses, parsed bodies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

// ── Headers ──────────────────────────────────────────────────────────────────

/// Case-insensitive header map. Names are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any previous value with the same name.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.as_ref().to_ascii_lowercase(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(&name.to_ascii_lowercase())
    }

    /// Overlay `other` on top of `self`; `other` wins on conflicts.
    pub fn merge(&mut self, other: &Headers) {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// Validate a header name (RFC 7230 token) and value (no control characters
/// other than horizontal tab).
pub fn validate_header(name: &str, value: &str) -> Result<(), ApiError> {
    const SEPARATORS: &str = "()<>@,;:\\\"/[]?={} \t";
    let valid_name = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_graphic() && !SEPARATORS.contains(c));
    if !valid_name {
        return Err(ApiError::new(format!("Invalid header name '{}'", name)));
    }
    if value.chars().any(|c| c.is_control() && c != '\t') {
        return Err(ApiError::new(format!("Invalid header value for '{}'", name)));
    }
    Ok(())
}

// ── Raw response ─────────────────────────────────────────────────────────────

/// A fully-read HTTP response as delivered by a transport or a cache store.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16) -> Self {
        Self {
            url: String::new(),
            status,
            status_text: canonical_reason(status).to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// JSON body with a matching `Content-Type`.
    pub fn with_json(self, value: &serde_json::Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(value.to_string())
    }

    /// Plain-text body with a matching `Content-Type`.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_header("content-type", "text/plain; charset=utf-8")
            .with_body(text.into())
    }

    /// Set the `Date` header in IMF-fixdate form.
    pub fn with_date(self, date: DateTime<Utc>) -> Self {
        self.with_header("date", format_http_date(date))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    /// The parsed `Date` header, if present and well-formed.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.headers.get("date").and_then(parse_http_date)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

pub fn format_http_date(date: DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn canonical_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

/// Best-effort error body: JSON, else non-empty text, else the status text.
pub(crate) fn parse_error_body(response: &RawResponse) -> serde_json::Value {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&response.body) {
        return value;
    }
    let text = response.text();
    if !text.trim().is_empty() {
        return serde_json::Value::String(text);
    }
    serde_json::Value::String(response.status_text.clone())
}

// ── Parsed response ──────────────────────────────────────────────────────────

/// A response body parsed according to its content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    /// `application/json`
    Json(serde_json::Value),
    /// `text/*`
    Text(String),
    /// Anything else; the body is left untouched.
    Raw(RawResponse),
}

impl ResponseData {
    pub fn parse(response: &RawResponse) -> Result<Self, ApiError> {
        let content_type = response
            .content_type()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if content_type.contains("application/json") {
            if response.body.iter().all(u8::is_ascii_whitespace) {
                return Ok(ResponseData::Json(serde_json::Value::Null));
            }
            let value = serde_json::from_slice(&response.body).map_err(|e| {
                ApiError::wrap(format!("Failed to parse JSON response: {}", e), e)
            })?;
            return Ok(ResponseData::Json(value));
        }
        if content_type.starts_with("text/") {
            return Ok(ResponseData::Text(response.text()));
        }
        Ok(ResponseData::Raw(response.clone()))
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseData::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseData::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&RawResponse> {
        match self {
            ResponseData::Raw(r) => Some(r),
            _ => None,
        }
    }
}

/// Result of a successful request.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub data: ResponseData,
    pub status: u16,
    pub headers: Headers,
    /// Served from the cache store without a network round trip.
    pub from_cache: bool,
    pub raw: RawResponse,
}

impl ApiResponse {
    /// Deserialize the parsed JSON body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        match &self.data {
            ResponseData::Json(v) => Ok(T::deserialize(v)?),
            _ => Err(ApiError::new(format!(
                "Response from {} is not JSON",
                self.raw.url
            ))),
        }
    }
}
