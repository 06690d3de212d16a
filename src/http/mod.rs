//! HTTP layer: `ApiClient` with caching, retry and cancellation over a
//! pluggable transport.

pub mod client;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;

pub use client::ApiClient;
pub use request::{Credentials, Method, RequestBody, RequestOptions, ResponseTransformer};
pub use response::{ApiResponse, Headers, RawResponse, ResponseData};
pub use retry::RetryConfig;
pub use transport::{Transport, TransportRequest};

#[cfg(feature = "http")]
pub use transport::ReqwestTransport;
