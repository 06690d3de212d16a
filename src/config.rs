//! Client configuration.
//!
//! [`ClientConfig`] is built once through [`ClientConfigBuilder`] (or loaded
//! from the environment) and is read-only afterwards. Per-request
//! [`RequestOptions`](crate::http::RequestOptions) override individual
//! fields for a single call.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::TokenProvider;
use crate::error::ApiError;
use crate::http::request::Credentials;
use crate::http::response::{validate_header, Headers};
use crate::http::retry::RetryConfig;
use crate::network;

/// Default request timeout in milliseconds.
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default time-to-live for cached GET responses.
const DEFAULT_CACHE_TTL_MS: u64 = 5 * 60 * 1000;

/// Default cache store name.
pub const DEFAULT_CACHE_NAME: &str = "grimoire-api-v1";

/// How GET requests consult the cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// Serve a fresh cached entry without touching the network.
    CacheFirst,
    /// Always hit the network; the response still populates the store.
    #[default]
    NetworkOnly,
}

impl CacheStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheFirst => "cache-first",
            Self::NetworkOnly => "network-only",
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-request cache options. `None` fields use the client defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    pub enabled: bool,
    pub strategy: Option<CacheStrategy>,
    pub cache_name: Option<String>,
    pub ttl: Option<Duration>,
    /// Bypass fresh entries and refetch.
    pub force_refresh: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: None,
            cache_name: None,
            ttl: None,
            force_refresh: false,
        }
    }
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_first() -> Self {
        Self::default().with_strategy(CacheStrategy::CacheFirst)
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = Some(name.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }
}

/// Immutable client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    base_url: String,
    headers: Headers,
    timeout: Option<Duration>,
    credentials: Credentials,
    retry: RetryConfig,
    cache_strategy: CacheStrategy,
    cache_ttl: Duration,
    cache_name: String,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl ClientConfig {
    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(base_url)
    }

    /// Load a config from the environment.
    ///
    /// | Variable                    | Meaning                              |
    /// |-----------------------------|--------------------------------------|
    /// | `GRIMOIRE_API_URL`          | base URL (default: current origin)   |
    /// | `GRIMOIRE_API_TIMEOUT_MS`   | request timeout, `0` disables it     |
    /// | `GRIMOIRE_API_MAX_RETRIES`  | retry budget, `0` disables retries   |
    /// | `GRIMOIRE_API_CACHE_TTL_MS` | default cache TTL                    |
    pub fn from_env() -> Result<Self, ApiError> {
        let base_url = std::env::var(network::API_URL_ENV).unwrap_or_else(|_| network::current_origin());
        let mut builder = ClientConfigBuilder::new(base_url);

        if let Some(ms) = env_u64(network::TIMEOUT_ENV)? {
            builder = if ms == 0 {
                builder.no_timeout()
            } else {
                builder.timeout(Duration::from_millis(ms))
            };
        }
        if let Some(n) = env_u64(network::MAX_RETRIES_ENV)? {
            let n = u32::try_from(n).map_err(|_| {
                ApiError::new(format!("{} out of range: {}", network::MAX_RETRIES_ENV, n))
            })?;
            builder = if n == 0 {
                builder.retry(false)
            } else {
                builder.max_retries(n)
            };
        }
        if let Some(ms) = env_u64(network::CACHE_TTL_ENV)? {
            builder = builder.cache_ttl(Duration::from_millis(ms));
        }

        builder.build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn cache_strategy(&self) -> CacheStrategy {
        self.cache_strategy
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn token_provider(&self) -> Option<&Arc<dyn TokenProvider>> {
        self.token_provider.as_ref()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("credentials", &self.credentials)
            .field("retry", &self.retry)
            .field("cache_strategy", &self.cache_strategy)
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_name", &self.cache_name)
            .field("token_provider", &self.token_provider.is_some())
            .finish()
    }
}

fn env_u64(name: &str) -> Result<Option<u64>, ApiError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ApiError::wrap(format!("Invalid {}: '{}'", name, raw), e)),
        Err(_) => Ok(None),
    }
}

/// Builder for [`ClientConfig`].
#[derive(Clone)]
pub struct ClientConfigBuilder {
    base_url: String,
    timeout: Option<Duration>,
    default_headers: Vec<(String, String)>,
    credentials: Credentials,
    retry: RetryConfig,
    cache_strategy: CacheStrategy,
    cache_ttl: Duration,
    cache_name: String,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl ClientConfigBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
            default_headers: Vec::new(),
            credentials: Credentials::default(),
            retry: RetryConfig::default(),
            cache_strategy: CacheStrategy::default(),
            cache_ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            token_provider: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Add a default header to all requests.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn retry(mut self, enabled: bool) -> Self {
        self.retry.enabled = enabled;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    /// Replace the whole retry configuration, including backoff timings.
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.cache_strategy = strategy;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// Token source for requests marked `authenticated`.
    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    pub fn build(self) -> Result<ClientConfig, ApiError> {
        if self.base_url.is_empty() {
            return Err(ApiError::new("Base URL cannot be empty"));
        }

        let mut headers = Headers::new();
        headers.insert("content-type", "application/json");
        headers.insert("accept", "application/json");

        for (name, value) in self.default_headers {
            validate_header(&name, &value)?;
            headers.insert(name, value);
        }

        Ok(ClientConfig {
            base_url: self.base_url,
            headers,
            timeout: self.timeout,
            credentials: self.credentials,
            retry: self.retry,
            cache_strategy: self.cache_strategy,
            cache_ttl: self.cache_ttl,
            cache_name: self.cache_name,
            token_provider: self.token_provider,
        })
    }
}
