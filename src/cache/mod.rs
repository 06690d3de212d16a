//! Named response caches.
//!
//! A [`CacheStorage`] holds any number of named stores, each mapping a
//! request URL to the last successful response. Freshness is judged from the
//! stored response's `Date` header, the same way a browser Cache Storage
//! entry would be.

mod memory;

pub use memory::MemoryCacheStorage;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::CacheStrategy;
use crate::error::CacheError;
use crate::http::response::{format_http_date, RawResponse};

/// Storage for named response caches.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Look up `url` in the store `cache_name`.
    async fn match_entry(&self, cache_name: &str, url: &str)
        -> Result<Option<RawResponse>, CacheError>;

    /// Store `response` under `url`, replacing any previous entry.
    async fn put(&self, cache_name: &str, url: &str, response: RawResponse)
        -> Result<(), CacheError>;

    /// Remove one entry. Returns whether it existed.
    async fn delete(&self, cache_name: &str, url: &str) -> Result<bool, CacheError>;

    /// Drop a whole store. Returns whether it existed.
    async fn delete_cache(&self, cache_name: &str) -> Result<bool, CacheError>;

    /// URLs currently held in a store.
    async fn keys(&self, cache_name: &str) -> Result<Vec<String>, CacheError>;
}

/// Cache settings resolved for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub strategy: CacheStrategy,
    pub cache_name: String,
    pub ttl: Duration,
    pub force_refresh: bool,
}

impl CachePolicy {
    /// Whether a lookup should happen before going to the network.
    pub fn reads_first(&self) -> bool {
        self.strategy == CacheStrategy::CacheFirst && !self.force_refresh
    }
}

/// Age of a stored entry at `now`. `None` when the entry has no readable
/// `Date` header. Entries dated in the future count as age zero.
pub fn entry_age(response: &RawResponse, now: DateTime<Utc>) -> Option<Duration> {
    let date = response.date()?;
    Some((now - date).to_std().unwrap_or(Duration::ZERO))
}

/// An entry is fresh while its age is below `ttl`. Undated entries are stale.
pub fn is_fresh(response: &RawResponse, ttl: Duration, now: DateTime<Utc>) -> bool {
    entry_age(response, now).is_some_and(|age| age < ttl)
}

/// Add a `Date` header when the origin did not send one, so the entry can
/// age.
pub(crate) fn stamp_date(response: &mut RawResponse, now: DateTime<Utc>) {
    if response.date().is_none() {
        response.headers.insert("date", format_http_date(now));
    }
}
