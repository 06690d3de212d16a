//! Shared helpers: a scripted transport and client constructors.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use grimoire_client::cache::MemoryCacheStorage;
use grimoire_client::config::{ClientConfig, ClientConfigBuilder};
use grimoire_client::error::TransportError;
use grimoire_client::http::{ApiClient, RawResponse, RetryConfig, Transport, TransportRequest};

pub const BASE_URL: &str = "https://guide.example.com/api";
pub const WIDGETS_URL: &str = "https://guide.example.com/api/widgets";

/// One scripted transport outcome.
pub enum Step {
    Respond(RawResponse),
    Fail(TransportError),
    /// Never completes; only cancellation or a deadline ends it.
    Hang,
}

/// Transport that replays scripted steps in order and records every request.
#[derive(Default)]
pub struct MockTransport {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// A transport that fails if it is ever called.
    pub fn idle() -> Arc<Self> {
        Self::new(Vec::<Step>::new())
    }

    pub fn respond(responses: impl IntoIterator<Item = RawResponse>) -> Arc<Self> {
        Self::new(responses.into_iter().map(Step::Respond))
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> TransportRequest {
        self.requests.lock().last().cloned().expect("no request was sent")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        let url = request.url.clone();
        self.requests.lock().push(request);
        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Respond(resp)) => Ok(resp.with_url(url)),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Hang) => futures_util::future::pending().await,
            None => Err(TransportError::Other("no scripted response left".into())),
        }
    }
}

/// Config with fast, jitter-free retries so tests do not sleep for seconds.
pub fn fast_config() -> ClientConfigBuilder {
    ClientConfig::builder(BASE_URL).retry_config(
        RetryConfig::default()
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
            .with_jitter(0.0),
    )
}

pub fn client(transport: Arc<MockTransport>) -> ApiClient {
    client_with(fast_config(), transport)
}

pub fn client_with(config: ClientConfigBuilder, transport: Arc<MockTransport>) -> ApiClient {
    ApiClient::with_transport(config.build().expect("valid config"), transport)
}

pub fn client_with_storage(
    config: ClientConfigBuilder,
    transport: Arc<MockTransport>,
    storage: Arc<MemoryCacheStorage>,
) -> ApiClient {
    client_with(config, transport).with_cache_storage(storage)
}

/// Poll `cond` until it holds, failing the test after about a second.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not met in time");
}
