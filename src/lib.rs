//! # Grimoire API client
//!
//! HTTP client used by the Grimoire guide to talk to its backend.
//!
//! ## Architecture
//!
//! 1. **Config**: `ClientConfig` built once, overridden per request by `RequestOptions`
//! 2. **Transport**: the `Transport` seam; `ReqwestTransport` with the `http` feature
//! 3. **Cache**: named response stores behind `CacheStorage` (in memory by default)
//! 4. **Client**: `ApiClient`: cache-first reads, retry with backoff, cancellation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use grimoire_client::prelude::*;
//!
//! let client = create_client(ClientConfig::builder("https://guide.example.com/api").build()?)?;
//!
//! let changelog = client
//!     .get("/changelog", RequestOptions::default().with_cache(CacheOptions::cache_first()))
//!     .await?;
//! println!("from cache: {}", changelog.from_cache);
//! ```

// ── Core ─────────────────────────────────────────────────────────────────────

/// Client error types.
pub mod error;

/// Client configuration and cache options.
pub mod config;

/// Origin and environment constants.
pub mod network;

/// Bearer-token providers.
pub mod auth;

/// Named response caches.
pub mod cache;

// ── HTTP ─────────────────────────────────────────────────────────────────────

/// `ApiClient`, request/response types, retry, transport.
pub mod http;

// ── Factory + default instance ───────────────────────────────────────────────

#[cfg(feature = "http")]
pub use factory::{create_client, default_client};

#[cfg(feature = "http")]
mod factory {
    use crate::config::ClientConfig;
    use crate::error::ApiError;
    use crate::http::ApiClient;
    use lazy_static::lazy_static;

    lazy_static! {
        static ref DEFAULT_CLIENT: Result<ApiClient, String> = ClientConfig::from_env()
            .and_then(ApiClient::new)
            .map_err(|e| e.to_string());
    }

    /// Build a reqwest-backed client from `config`.
    pub fn create_client(config: ClientConfig) -> Result<ApiClient, ApiError> {
        ApiClient::new(config)
    }

    /// Shared client bound to the current origin (see
    /// [`network::current_origin`](crate::network::current_origin)), built on
    /// first use from the environment. Clones share caches and in-flight
    /// tracking.
    pub fn default_client() -> Result<ApiClient, ApiError> {
        DEFAULT_CLIENT
            .as_ref()
            .map(ApiClient::clone)
            .map_err(|e| ApiError::new(format!("Default client unavailable: {}", e)))
    }
}

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    pub use crate::auth::{SessionToken, StaticToken, TokenProvider};
    pub use crate::cache::{CacheStorage, MemoryCacheStorage};
    pub use crate::config::{CacheOptions, CacheStrategy, ClientConfig, ClientConfigBuilder};
    pub use crate::error::{ApiError, CacheError, TransportError};
    pub use crate::http::{
        ApiClient, ApiResponse, Credentials, Headers, Method, RawResponse, RequestBody,
        RequestOptions, ResponseData, RetryConfig, Transport, TransportRequest,
    };

    #[cfg(feature = "http")]
    pub use crate::http::ReqwestTransport;
    #[cfg(feature = "http")]
    pub use crate::{create_client, default_client};
}
