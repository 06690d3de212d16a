//! `ApiClient`: request pipeline with caching, retry and cancellation.
//!
//! Each `request()` runs:
//!
//! ```text
//! Pending ──► CacheHit ─────────────────────────────► Success
//!    │
//!    └──► NetworkInFlight ──► Success
//!              │         └──► TerminalError
//!              └──► RetryScheduled ──(backoff)──► NetworkInFlight
//! ```
//!
//! Every request is tracked per client under its id from the moment it
//! starts: in the abort-controller table while an attempt runs (cache lookup,
//! token provider, network call) and in the retry-timer table while it waits
//! out a backoff delay. `cancel_request` / `cancel_all_requests` abort
//! whichever handle is registered. Entries are removed on every exit path,
//! including when the caller drops the request future.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_timer::Delay;
use futures_util::future::{self, AbortHandle, AbortRegistration, Abortable, Either};
use parking_lot::Mutex;
use serde::Serialize;

use crate::cache::{self, CachePolicy, CacheStorage, MemoryCacheStorage};
use crate::config::{CacheOptions, ClientConfig};
use crate::error::ApiError;
use crate::http::request::{Method, RequestBody, RequestOptions};
use crate::http::response::{ApiResponse, Headers, RawResponse, ResponseData};
use crate::http::transport::{Transport, TransportRequest};

/// HTTP client with caching, retry and cancellation.
pub struct ApiClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    cache: Option<Arc<dyn CacheStorage>>,
    requests: Arc<Mutex<RequestTable>>,
    sequence: Arc<AtomicU64>,
}

impl ApiClient {
    /// Create a client that talks HTTP through reqwest.
    #[cfg(feature = "http")]
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let transport = crate::http::transport::ReqwestTransport::new()?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client over any transport. Responses are cached in memory
    /// unless another storage is set with [`with_cache_storage`](Self::with_cache_storage).
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            cache: Some(Arc::new(MemoryCacheStorage::new())),
            requests: Arc::new(Mutex::new(RequestTable::default())),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_cache_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.cache = Some(storage);
        self
    }

    /// Disable caching entirely, as when no cache storage is available.
    pub fn without_cache_storage(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url()
    }

    pub fn cache_storage(&self) -> Option<&Arc<dyn CacheStorage>> {
        self.cache.as_ref()
    }

    // ── Convenience methods ──────────────────────────────────────────────

    pub async fn get(&self, target: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(options.with_method(Method::Get).with_target(target))
            .await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        target: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        self.send_with_body(Method::Post, target, body, options).await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        target: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        self.send_with_body(Method::Put, target, body, options).await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        target: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        self.send_with_body(Method::Patch, target, body, options).await
    }

    pub async fn delete(&self, target: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(options.with_method(Method::Delete).with_target(target))
            .await
    }

    async fn send_with_body<B: Serialize + ?Sized>(
        &self,
        method: Method,
        target: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let body = RequestBody::json(body)?;
        self.request(options.with_method(method).with_target(target).with_body(body))
            .await
    }

    // ── Request pipeline ─────────────────────────────────────────────────

    /// Execute a request: cache lookup, network call, retries.
    pub async fn request(&self, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        let url = options.resolve_url(self.config.base_url());
        let policy = self.cache_policy(&options);
        let max_retries = self.retry_budget(&options);
        let timeout = options.timeout.or(self.config.timeout());
        let request_id = options
            .request_id
            .clone()
            .unwrap_or_else(|| self.next_request_id(options.method, &url));
        let owner = self.sequence.fetch_add(1, Ordering::Relaxed);

        let (tracker, mut registration) = Tracker::start(&self.requests, &request_id, owner)?;
        let mut attempt = 0;
        loop {
            let run = async {
                if attempt == 0 {
                    if let Some(policy) = policy.as_ref().filter(|p| p.reads_first()) {
                        if let Some(response) = self.read_cache(policy, &url, &options).await {
                            return Ok(response);
                        }
                    }
                }
                self.send_once(&url, &options, policy.as_ref()).await
            };
            let err = match guarded(&request_id, run, registration, timeout).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if !err.is_retryable() || attempt >= max_retries {
                return Err(err);
            }

            let delay = self.config.retry().delay_for_attempt(attempt);
            tracing::debug!(
                attempt = attempt + 1,
                max_retries,
                delay_ms = delay.as_millis() as u64,
                status = ?err.status,
                error = %err,
                "Retrying request to {}",
                url
            );
            let timer = tracker.enter(Phase::RetryWait)?;
            Abortable::new(Delay::new(delay), timer)
                .await
                .map_err(|_| ApiError::timeout("Request was cancelled while waiting to retry"))?;
            registration = tracker.enter(Phase::Attempt)?;
            attempt += 1;
        }
    }

    /// One network attempt: headers, transport call, cache write, parse.
    async fn send_once(
        &self,
        url: &str,
        options: &RequestOptions,
        policy: Option<&CachePolicy>,
    ) -> Result<ApiResponse, ApiError> {
        let request = TransportRequest {
            method: options.method,
            url: url.to_string(),
            headers: self.merged_headers(options).await?,
            body: options.body.as_ref().map(RequestBody::to_bytes),
            credentials: options.credentials.unwrap_or(self.config.credentials()),
        };

        let raw = self.transport.send(request).await?;

        if !raw.is_success() {
            return Err(ApiError::from_response(raw));
        }
        if let Some(policy) = policy {
            self.write_cache(policy, url, &raw).await;
        }
        self.finish(raw, false, options)
    }

    async fn merged_headers(&self, options: &RequestOptions) -> Result<Headers, ApiError> {
        let mut headers = self.config.headers().clone();
        if let Some(content_type) = options.body.as_ref().and_then(RequestBody::content_type) {
            headers.insert("content-type", content_type);
        }
        headers.merge(&options.headers);

        if options.authenticated {
            if let Some(provider) = self.config.token_provider() {
                if let Some(token) = provider.token().await? {
                    headers.insert("authorization", format!("Bearer {}", token));
                }
            }
        }
        Ok(headers)
    }

    fn finish(
        &self,
        raw: RawResponse,
        from_cache: bool,
        options: &RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let mut data = ResponseData::parse(&raw)?;
        if let Some(transform) = &options.transform {
            data = transform(data)?;
        }
        Ok(ApiResponse {
            data,
            status: raw.status,
            headers: raw.headers.clone(),
            from_cache,
            raw,
        })
    }

    fn retry_budget(&self, options: &RequestOptions) -> u32 {
        let retry = self.config.retry();
        if options.retry.unwrap_or(retry.enabled) {
            options.max_retries.unwrap_or(retry.max_retries)
        } else {
            0
        }
    }

    fn next_request_id(&self, method: Method, url: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}:{}:{}:{}", method, url, Utc::now().timestamp_millis(), seq)
    }

    // ── Cache ────────────────────────────────────────────────────────────

    /// Resolved cache settings, or `None` when this request bypasses the
    /// cache (not a GET, disabled, or no storage).
    fn cache_policy(&self, options: &RequestOptions) -> Option<CachePolicy> {
        if self.cache.is_none() || !options.cache.enabled || options.method != Method::Get {
            return None;
        }
        let cache = &options.cache;
        Some(CachePolicy {
            strategy: cache.strategy.unwrap_or(self.config.cache_strategy()),
            cache_name: cache
                .cache_name
                .clone()
                .unwrap_or_else(|| self.config.cache_name().to_string()),
            ttl: cache.ttl.unwrap_or(self.config.cache_ttl()),
            force_refresh: cache.force_refresh,
        })
    }

    async fn read_cache(
        &self,
        policy: &CachePolicy,
        url: &str,
        options: &RequestOptions,
    ) -> Option<ApiResponse> {
        let storage = self.cache.as_ref()?;
        let entry = match storage.match_entry(&policy.cache_name, url).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!(cache = %policy.cache_name, "Cache miss for {}", url);
                return None;
            }
            Err(e) => {
                tracing::warn!(cache = %policy.cache_name, error = %e, "Cache lookup failed for {}", url);
                return None;
            }
        };

        if !cache::is_fresh(&entry, policy.ttl, Utc::now()) {
            tracing::debug!(cache = %policy.cache_name, "Cached entry for {} is stale", url);
            return None;
        }

        match self.finish(entry, true, options) {
            Ok(response) => {
                tracing::debug!(cache = %policy.cache_name, "Serving {} from cache", url);
                Some(response)
            }
            Err(e) => {
                tracing::warn!(cache = %policy.cache_name, error = %e, "Unreadable cache entry for {}", url);
                None
            }
        }
    }

    async fn write_cache(&self, policy: &CachePolicy, url: &str, raw: &RawResponse) {
        let Some(storage) = &self.cache else {
            return;
        };
        let mut entry = raw.clone();
        cache::stamp_date(&mut entry, Utc::now());
        if let Err(e) = storage.put(&policy.cache_name, url, entry).await {
            tracing::warn!(cache = %policy.cache_name, error = %e, "Failed to cache response for {}", url);
        }
    }

    /// Delete a single cached entry. Returns whether an entry was removed;
    /// failures are logged and reported as `false`.
    pub async fn clear_cache(&self, url_or_path: &str, cache_name: Option<&str>) -> bool {
        let Some(storage) = &self.cache else {
            return false;
        };
        let url = RequestOptions::new(Method::Get, url_or_path).resolve_url(self.config.base_url());
        let name = cache_name.unwrap_or(self.config.cache_name());
        match storage.delete(name, &url).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::debug!(cache = %name, error = %e, "Failed to clear cache entry for {}", url);
                false
            }
        }
    }

    /// Drop a whole named store (the default store when `cache_name` is
    /// `None`).
    pub async fn clear_cache_store(&self, cache_name: Option<&str>) -> bool {
        let Some(storage) = &self.cache else {
            return false;
        };
        let name = cache_name.unwrap_or(self.config.cache_name());
        match storage.delete_cache(name).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::debug!(cache = %name, error = %e, "Failed to clear cache store");
                false
            }
        }
    }

    /// Warm the cache with a forced-refresh GET. Errors are swallowed.
    pub async fn prefetch(&self, url_or_path: &str, cache: Option<CacheOptions>) {
        let mut cache = cache.unwrap_or_default();
        cache.enabled = true;
        cache.force_refresh = true;

        let options = RequestOptions::new(Method::Get, url_or_path).with_cache(cache);
        if let Err(e) = self.request(options).await {
            tracing::debug!(error = %e, "Prefetch of {} failed", url_or_path);
        }
    }

    // ── Cancellation ─────────────────────────────────────────────────────

    /// Abort the request with this id, whether an attempt is running or it
    /// is waiting to retry. Returns whether anything was cancelled.
    pub fn cancel_request(&self, request_id: &str) -> bool {
        let slot = {
            let mut table = self.requests.lock();
            table
                .abort_controllers
                .remove(request_id)
                .or_else(|| table.retry_timers.remove(request_id))
        };
        match slot {
            Some(slot) => {
                slot.handle.abort();
                tracing::debug!(request_id, "Cancelled request");
                true
            }
            None => false,
        }
    }

    /// Abort every in-flight request and pending retry. Returns how many
    /// requests were cancelled.
    pub fn cancel_all_requests(&self) -> usize {
        let slots: Vec<Slot> = {
            let mut table = self.requests.lock();
            let table = &mut *table;
            table
                .abort_controllers
                .drain()
                .chain(table.retry_timers.drain())
                .map(|(_, slot)| slot)
                .collect()
        };
        for slot in &slots {
            slot.handle.abort();
        }
        if !slots.is_empty() {
            tracing::debug!(count = slots.len(), "Cancelled all requests");
        }
        slots.len()
    }

    /// Ids of requests with an attempt in flight.
    pub fn in_flight_requests(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.requests.lock().abort_controllers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of requests waiting out a retry delay.
    pub fn pending_retries(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.requests.lock().retry_timers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Run one attempt under its cancellation handle and optional deadline.
async fn guarded<F>(
    request_id: &str,
    attempt: F,
    registration: AbortRegistration,
    timeout: Option<Duration>,
) -> Result<ApiResponse, ApiError>
where
    F: Future<Output = Result<ApiResponse, ApiError>>,
{
    let attempt = Abortable::new(attempt, registration);
    let outcome = match timeout {
        Some(limit) => match future::select(Box::pin(attempt), Delay::new(limit)).await {
            Either::Left((outcome, _)) => outcome,
            Either::Right(_) => {
                tracing::debug!(request_id, timeout_ms = limit.as_millis() as u64, "Request timed out");
                return Err(ApiError::timeout(format!(
                    "Request timed out after {}ms",
                    limit.as_millis()
                )));
            }
        },
        None => attempt.await,
    };

    outcome.unwrap_or_else(|_aborted| {
        tracing::debug!(request_id, "Request cancelled");
        Err(ApiError::timeout("Request was cancelled"))
    })
}

impl Clone for ApiClient {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            transport: self.transport.clone(),
            cache: self.cache.clone(),
            requests: self.requests.clone(),
            sequence: self.sequence.clone(),
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (in_flight, pending_retries) = {
            let table = self.requests.lock();
            (table.abort_controllers.len(), table.retry_timers.len())
        };
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("cache", &self.cache.is_some())
            .field("in_flight", &in_flight)
            .field("pending_retries", &pending_retries)
            .finish()
    }
}

/// Abort handle registered for a request, tagged with the request that owns it.
struct Slot {
    owner: u64,
    handle: AbortHandle,
}

/// Per-client tracking. An outstanding request id lives in exactly one of
/// the two tables.
#[derive(Default)]
struct RequestTable {
    /// Request id → handle of the running attempt.
    abort_controllers: HashMap<String, Slot>,
    /// Request id → handle of the pending backoff delay.
    retry_timers: HashMap<String, Slot>,
}

impl RequestTable {
    fn contains(&self, id: &str) -> bool {
        self.abort_controllers.contains_key(id) || self.retry_timers.contains_key(id)
    }

    /// Remove `id` if `owner` still holds it. Returns whether it did.
    fn release(&mut self, id: &str, owner: u64) -> bool {
        for table in [&mut self.abort_controllers, &mut self.retry_timers] {
            if table.get(id).is_some_and(|slot| slot.owner == owner) {
                table.remove(id);
                return true;
            }
        }
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Attempt,
    RetryWait,
}

/// A request's claim on its id. Dropping it removes whatever entry the
/// request still holds.
struct Tracker<'a> {
    table: &'a Mutex<RequestTable>,
    id: &'a str,
    owner: u64,
}

impl<'a> Tracker<'a> {
    /// Claim `id` and register the handle for the first attempt. Fails when
    /// another outstanding request holds the id.
    fn start(
        table: &'a Mutex<RequestTable>,
        id: &'a str,
        owner: u64,
    ) -> Result<(Self, AbortRegistration), ApiError> {
        let mut guard = table.lock();
        if guard.contains(id) {
            return Err(ApiError::new(format!("Request id {} is already in use", id)));
        }
        let (handle, registration) = AbortHandle::new_pair();
        guard.abort_controllers.insert(id.to_string(), Slot { owner, handle });
        Ok((Self { table, id, owner }, registration))
    }

    /// Move the claim into the table for `phase` under a fresh handle. Fails
    /// when the request was cancelled since its last phase.
    fn enter(&self, phase: Phase) -> Result<AbortRegistration, ApiError> {
        let mut guard = self.table.lock();
        if !guard.release(self.id, self.owner) {
            return Err(ApiError::timeout("Request was cancelled"));
        }
        let (handle, registration) = AbortHandle::new_pair();
        let slot = Slot { owner: self.owner, handle };
        match phase {
            Phase::Attempt => guard.abort_controllers.insert(self.id.to_string(), slot),
            Phase::RetryWait => guard.retry_timers.insert(self.id.to_string(), slot),
        };
        Ok(registration)
    }
}

impl Drop for Tracker<'_> {
    fn drop(&mut self) {
        self.table.lock().release(self.id, self.owner);
    }
}
