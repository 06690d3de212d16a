//! Request options and URL resolution.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::CacheOptions;
use crate::error::ApiError;
use crate::http::response::{Headers, ResponseData};

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Credentials mode, mirroring the fetch `credentials` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Credentials {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl RequestBody {
    /// Serialize `value` into a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, ApiError> {
        Ok(RequestBody::Json(serde_json::to_value(value)?))
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            RequestBody::Json(_) => Some("application/json"),
            RequestBody::Text(_) => Some("text/plain; charset=utf-8"),
            RequestBody::Bytes(_) => None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            RequestBody::Json(v) => v.to_string().into_bytes(),
            RequestBody::Text(t) => t.clone().into_bytes(),
            RequestBody::Bytes(b) => b.clone(),
        }
    }
}

/// Post-processing hook applied to a parsed body before it is returned.
pub type ResponseTransformer =
    Arc<dyn Fn(ResponseData) -> Result<ResponseData, ApiError> + Send + Sync>;

/// Per-request options. Unset fields fall back to the client's
/// [`ClientConfig`](crate::config::ClientConfig).
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    /// Absolute URL; takes precedence over `path`.
    pub url: Option<String>,
    /// Path appended to the base URL.
    pub path: String,
    pub body: Option<RequestBody>,
    pub headers: Headers,
    pub params: Vec<(String, String)>,
    pub cache: CacheOptions,
    pub timeout: Option<Duration>,
    pub credentials: Option<Credentials>,
    pub transform: Option<ResponseTransformer>,
    pub retry: Option<bool>,
    pub max_retries: Option<u32>,
    /// Attach a bearer token from the configured token provider.
    pub authenticated: bool,
    /// Caller-chosen id for `cancel_request`; generated when absent. A
    /// request whose id is held by another outstanding request fails
    /// without being sent.
    pub request_id: Option<String>,
}

impl RequestOptions {
    /// Options for `method` against `target`, which is either an absolute
    /// URL or a path relative to the base URL.
    pub fn new(method: Method, target: &str) -> Self {
        Self {
            method,
            ..Self::default()
        }
        .with_target(target)
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_target(mut self, target: &str) -> Self {
        if is_absolute_url(target) {
            self.url = Some(target.to_string());
            self.path.clear();
        } else {
            self.url = None;
            self.path = target.to_string();
        }
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    pub fn with_cache(mut self, cache: CacheOptions) -> Self {
        self.cache = cache;
        self
    }

    /// Skip the cache store entirely for this request.
    pub fn without_cache(mut self) -> Self {
        self.cache.enabled = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(ResponseData) -> Result<ResponseData, ApiError> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.authenticated = true;
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Final request URL: explicit `url`, else `base_url + path`, then the
    /// query parameters.
    pub fn resolve_url(&self, base_url: &str) -> String {
        let url = match &self.url {
            Some(url) => url.clone(),
            None => join_url(base_url, &self.path),
        };
        append_query(url, &self.params)
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("path", &self.path)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("cache", &self.cache)
            .field("timeout", &self.timeout)
            .field("credentials", &self.credentials)
            .field("transform", &self.transform.is_some())
            .field("retry", &self.retry)
            .field("max_retries", &self.max_retries)
            .field("authenticated", &self.authenticated)
            .field("request_id", &self.request_id)
            .finish()
    }
}

pub fn is_absolute_url(target: &str) -> bool {
    let lower = target.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

fn append_query(mut url: String, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return url;
    }
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    if url.contains('?') {
        if !url.ends_with('?') && !url.ends_with('&') {
            url.push('&');
        }
    } else {
        url.push('?');
    }
    url.push_str(&query);
    url
}
