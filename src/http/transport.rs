//! Transport seam: the single place a request leaves the process.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::http::request::{Credentials, Method};
use crate::http::response::{Headers, RawResponse};

/// A fully-resolved request handed to a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    pub credentials: Credentials,
}

/// Sends requests and reads the complete response.
///
/// Implementations must not apply their own retry or cache logic; the
/// client owns both. Dropping the returned future must abandon the request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError>;
}

#[cfg(feature = "http")]
pub use reqwest_transport::ReqwestTransport;

#[cfg(feature = "http")]
mod reqwest_transport {
    use super::*;
    use crate::error::ApiError;
    use reqwest::Client;

    /// [`Transport`] backed by `reqwest`.
    ///
    /// Deadlines are enforced by the client, so the underlying reqwest client
    /// is built without a timeout. The credentials mode has no native
    /// equivalent and is ignored here.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: Client,
    }

    impl ReqwestTransport {
        pub fn new() -> Result<Self, ApiError> {
            let mut builder = Client::builder();
            #[cfg(not(target_arch = "wasm32"))]
            {
                builder = builder.pool_max_idle_per_host(10);
            }
            let client = builder
                .build()
                .map_err(|e| ApiError::wrap(format!("Failed to build HTTP client: {}", e), e))?;
            Ok(Self { client })
        }

        /// Wrap an already-configured reqwest client.
        pub fn from_client(client: Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl Transport for ReqwestTransport {
        async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
            let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

            let mut req = self.client.request(method, &request.url);
            for (name, value) in request.headers.iter() {
                req = req.header(name, value);
            }
            if let Some(body) = request.body {
                req = req.body(body);
            }

            let resp = req.send().await.map_err(classify)?;

            let status = resp.status();
            let url = resp.url().to_string();
            let headers: Headers = resp
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = resp.bytes().await.map_err(classify)?;

            Ok(RawResponse {
                url,
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                headers,
                body: body.to_vec(),
            })
        }
    }

    fn classify(err: reqwest::Error) -> TransportError {
        if err.is_builder() {
            return TransportError::InvalidRequest(err.to_string());
        }
        #[cfg(not(target_arch = "wasm32"))]
        let network = err.is_connect() || err.is_timeout() || err.is_request();
        #[cfg(target_arch = "wasm32")]
        let network = err.is_timeout() || err.is_request();

        if network {
            TransportError::Network(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}
