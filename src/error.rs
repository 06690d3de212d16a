//! Client error types.
//!
//! Every failure a caller sees is an [`ApiError`]. Callers branch on its
//! flags (`status`, `is_network_error`, `is_timeout`) rather than on distinct
//! types. [`TransportError`] and [`CacheError`] are the seam-level errors that
//! transports and cache stores return; the client converts them at its
//! boundary.

use thiserror::Error;

use crate::http::response::{parse_error_body, RawResponse};
use crate::http::retry::RetryConfig;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified API error.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ApiError {
    /// Human-readable message.
    pub message: String,
    /// HTTP status, when the server answered.
    pub status: Option<u16>,
    /// Parsed error body (JSON, else text, else status text).
    pub data: Option<serde_json::Value>,
    /// Connectivity failure; the request never got a response.
    pub is_network_error: bool,
    /// The request was aborted, either by its deadline or by cancellation.
    pub is_timeout: bool,
    /// The raw response behind an HTTP error.
    pub response: Option<RawResponse>,
    /// The originating error, if any.
    #[source]
    pub source: Option<BoxError>,
}

impl ApiError {
    /// A generic error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            data: None,
            is_network_error: false,
            is_timeout: false,
            response: None,
            source: None,
        }
    }

    /// Wrap an unexpected error, keeping it as the source.
    pub fn wrap(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::new(message)
        }
    }

    /// A connectivity failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            is_network_error: true,
            ..Self::new(message)
        }
    }

    /// A deadline expiry or an explicit cancellation.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            is_timeout: true,
            ..Self::new(message)
        }
    }

    /// Build an HTTP error from a non-2xx response.
    pub fn from_response(response: RawResponse) -> Self {
        let data = parse_error_body(&response);
        let message = data
            .get("message")
            .or_else(|| data.get("error"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status {}", response.status));

        Self {
            status: Some(response.status),
            data: Some(data),
            response: Some(response),
            ..Self::new(message)
        }
    }

    /// Whether the client may retry after this error: 5xx, 429 and network
    /// failures. Timeouts and cancellations are final.
    pub fn is_retryable(&self) -> bool {
        if self.is_timeout {
            return false;
        }
        if self.is_network_error {
            return true;
        }
        self.status.is_some_and(RetryConfig::is_retryable_status)
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self.status, Some(400..=499))
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self.status, Some(500..=599))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::wrap(format!("Serialization error: {}", err), err)
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Aborted => ApiError::timeout("Request was aborted"),
            TransportError::Network(msg) => ApiError::network(format!("Network error: {}", msg)),
            other => ApiError::wrap(format!("Request failed: {}", other), other),
        }
    }
}

/// Errors returned by a [`Transport`](crate::http::transport::Transport).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not reach the server (DNS, connect, reset).
    #[error("{0}")]
    Network(String),

    /// The underlying request was aborted.
    #[error("Request aborted")]
    Aborted,

    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Other(String),
}

/// Errors returned by a [`CacheStorage`](crate::cache::CacheStorage).
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache storage unavailable")]
    Unavailable,

    #[error("Cache storage error: {0}")]
    Storage(String),

    #[error("Invalid cache entry: {0}")]
    InvalidEntry(String),
}
