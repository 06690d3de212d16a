//! Cache-first reads, cache population and cache maintenance.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use common::*;
use grimoire_client::cache::{CacheStorage, MemoryCacheStorage};
use grimoire_client::config::{CacheOptions, CacheStrategy};
use grimoire_client::error::{ApiError, CacheError};
use grimoire_client::http::{RawResponse, RequestOptions, ResponseData};

fn widget(id: u32) -> RawResponse {
    RawResponse::new(200).with_json(&json!({ "id": id }))
}

fn cache_first(ttl_ms: u64) -> RequestOptions {
    RequestOptions::default().with_cache(
        CacheOptions::cache_first().with_ttl(Duration::from_millis(ttl_ms)),
    )
}

async fn seed(storage: &MemoryCacheStorage, age_secs: i64, body: serde_json::Value) {
    let entry = RawResponse::new(200)
        .with_json(&body)
        .with_date(Utc::now() - chrono::Duration::seconds(age_secs));
    storage
        .put(grimoire_client::config::DEFAULT_CACHE_NAME, WIDGETS_URL, entry)
        .await
        .unwrap();
}

#[tokio::test]
async fn fresh_entry_is_served_without_network() {
    let storage = Arc::new(MemoryCacheStorage::new());
    seed(&storage, 10, json!({"id": 1})).await;
    let transport = MockTransport::respond([widget(2)]);
    let client = client_with_storage(fast_config(), transport.clone(), storage);

    let resp = assert_ok!(client.get("/widgets", cache_first(60_000)).await);

    assert!(resp.from_cache);
    assert_eq!(resp.data, ResponseData::Json(json!({"id": 1})));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn stale_entry_goes_to_network_and_is_replaced() {
    let storage = Arc::new(MemoryCacheStorage::new());
    seed(&storage, 120, json!({"id": 1})).await;
    let transport = MockTransport::respond([widget(2), widget(3)]);
    let client = client_with_storage(fast_config(), transport.clone(), storage);

    let resp = assert_ok!(client.get("/widgets", cache_first(60_000)).await);
    assert!(!resp.from_cache);
    assert_eq!(resp.data, ResponseData::Json(json!({"id": 2})));

    // The refreshed entry is now fresh
    let again = assert_ok!(client.get("/widgets", cache_first(60_000)).await);
    assert!(again.from_cache);
    assert_eq!(again.data, ResponseData::Json(json!({"id": 2})));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn force_refresh_bypasses_fresh_entry() {
    let storage = Arc::new(MemoryCacheStorage::new());
    seed(&storage, 1, json!({"id": 1})).await;
    let transport = MockTransport::respond([widget(2)]);
    let client = client_with_storage(fast_config(), transport.clone(), storage);

    let options = RequestOptions::default().with_cache(
        CacheOptions::cache_first()
            .with_ttl(Duration::from_secs(3600))
            .with_force_refresh(),
    );
    let resp = assert_ok!(client.get("/widgets", options).await);

    assert!(!resp.from_cache);
    assert_eq!(resp.data, ResponseData::Json(json!({"id": 2})));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn cached_read_matches_network_parse() {
    let body = json!({"id": 1, "title": "Installing the DUB Edition", "tags": ["setup", "deck"]});
    let transport = MockTransport::respond([RawResponse::new(200).with_json(&body)]);
    let client = client(transport.clone());

    // Network-only still populates the store
    let from_network = assert_ok!(client.get("/widgets", RequestOptions::default()).await);
    let from_cache = assert_ok!(client.get("/widgets", cache_first(60_000)).await);

    assert!(!from_network.from_cache);
    assert!(from_cache.from_cache);
    assert_eq!(from_network.data, from_cache.data);
    assert_eq!(from_cache.raw.body, from_network.raw.body);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn default_strategy_comes_from_config() {
    let storage = Arc::new(MemoryCacheStorage::new());
    seed(&storage, 5, json!({"id": 1})).await;
    let transport = MockTransport::respond([widget(2)]);
    let config = fast_config().cache_strategy(CacheStrategy::CacheFirst);
    let client = client_with_storage(config, transport.clone(), storage);

    let resp = assert_ok!(client.get("/widgets", RequestOptions::default()).await);
    assert!(resp.from_cache);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn error_responses_are_not_cached() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let transport = MockTransport::respond([RawResponse::new(404)]);
    let client = client_with_storage(fast_config(), transport, storage.clone());

    assert_err!(client.get("/widgets", RequestOptions::default()).await);
    assert!(storage
        .keys(grimoire_client::config::DEFAULT_CACHE_NAME)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn non_get_requests_bypass_cache() {
    let storage = Arc::new(MemoryCacheStorage::new());
    seed(&storage, 1, json!({"id": 1})).await;
    let transport = MockTransport::respond([RawResponse::new(201).with_json(&json!({"id": 9}))]);
    let client = client_with_storage(fast_config(), transport.clone(), storage.clone());

    let resp = assert_ok!(client.post("/widgets", &json!({"name": "a"}), cache_first(60_000)).await);
    assert!(!resp.from_cache);
    assert_eq!(transport.calls(), 1);

    // The seeded GET entry is untouched
    let entry = storage
        .match_entry(grimoire_client::config::DEFAULT_CACHE_NAME, WIDGETS_URL)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.json::<serde_json::Value>().unwrap(), json!({"id": 1}));
}

#[tokio::test]
async fn named_store_is_used() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let transport = MockTransport::respond([widget(1)]);
    let client = client_with_storage(fast_config(), transport, storage.clone());

    let options = RequestOptions::default().with_cache(CacheOptions::new().with_cache_name("changelog"));
    assert_ok!(client.get("/widgets", options).await);

    assert_eq!(storage.keys("changelog").await.unwrap(), vec![WIDGETS_URL.to_string()]);
    assert_eq!(storage.cache_names().await, vec!["changelog"]);
}

#[tokio::test]
async fn clear_cache_removes_single_entry() {
    let storage = Arc::new(MemoryCacheStorage::new());
    seed(&storage, 1, json!({"id": 1})).await;
    let client = client_with_storage(fast_config(), MockTransport::idle(), storage.clone());

    assert!(client.clear_cache("/widgets", None).await);
    assert!(!client.clear_cache(WIDGETS_URL, None).await);
    assert!(!client.clear_cache("/widgets", Some("missing")).await);
}

#[tokio::test]
async fn clear_cache_without_storage_is_a_no_op() {
    let client = client(MockTransport::idle()).without_cache_storage();
    assert!(!client.clear_cache("/widgets", None).await);
    assert!(!client.clear_cache_store(None).await);
}

#[tokio::test]
async fn clear_cache_store_drops_everything() {
    let storage = Arc::new(MemoryCacheStorage::new());
    seed(&storage, 1, json!({"id": 1})).await;
    let client = client_with_storage(fast_config(), MockTransport::idle(), storage.clone());

    assert!(client.clear_cache_store(None).await);
    assert!(storage.cache_names().await.is_empty());
}

#[tokio::test]
async fn prefetch_warms_cache_even_when_fresh() {
    let storage = Arc::new(MemoryCacheStorage::new());
    seed(&storage, 1, json!({"id": 1})).await;
    let transport = MockTransport::respond([widget(2)]);
    let client = client_with_storage(fast_config(), transport.clone(), storage);

    client.prefetch("/widgets", Some(CacheOptions::cache_first())).await;
    assert_eq!(transport.calls(), 1);

    let resp = assert_ok!(client.get("/widgets", cache_first(60_000)).await);
    assert!(resp.from_cache);
    assert_eq!(resp.data, ResponseData::Json(json!({"id": 2})));
}

#[tokio::test]
async fn prefetch_swallows_errors() {
    let transport = MockTransport::respond([RawResponse::new(404)]);
    let client = client(transport.clone());

    client.prefetch("/widgets", None).await;
    assert_eq!(transport.calls(), 1);
}

struct BrokenStorage;

#[async_trait]
impl CacheStorage for BrokenStorage {
    async fn match_entry(&self, _: &str, _: &str) -> Result<Option<RawResponse>, CacheError> {
        Err(CacheError::Storage("quota exceeded".into()))
    }

    async fn put(&self, _: &str, _: &str, _: RawResponse) -> Result<(), CacheError> {
        Err(CacheError::Storage("quota exceeded".into()))
    }

    async fn delete(&self, _: &str, _: &str) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable)
    }

    async fn delete_cache(&self, _: &str) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable)
    }

    async fn keys(&self, _: &str) -> Result<Vec<String>, CacheError> {
        Err(CacheError::Unavailable)
    }
}

#[tokio::test]
async fn cache_failures_fall_through_to_network() {
    let transport = MockTransport::respond([widget(1)]);
    let client = client(transport.clone()).with_cache_storage(Arc::new(BrokenStorage));

    let resp = assert_ok!(client.get("/widgets", cache_first(60_000)).await);
    assert!(!resp.from_cache);
    assert_eq!(resp.data, ResponseData::Json(json!({"id": 1})));
    assert_eq!(transport.calls(), 1);

    assert!(!client.clear_cache("/widgets", None).await);
}

#[tokio::test]
async fn transformer_applies_to_network_and_cache() {
    let transport = MockTransport::respond([RawResponse::new(200).with_json(&json!({"items": [1, 2, 3]}))]);
    let client = client(transport);

    let count_items = |data: ResponseData| -> Result<ResponseData, ApiError> {
        let count = data
            .as_json()
            .and_then(|v| v["items"].as_array())
            .map(|items| items.len())
            .unwrap_or(0);
        Ok(ResponseData::Json(json!(count)))
    };

    let network = assert_ok!(
        client
            .get("/widgets", cache_first(60_000).with_transform(count_items))
            .await
    );
    let cached = assert_ok!(
        client
            .get("/widgets", cache_first(60_000).with_transform(count_items))
            .await
    );

    assert_eq!(network.data, ResponseData::Json(json!(3)));
    assert!(cached.from_cache);
    assert_eq!(cached.data, ResponseData::Json(json!(3)));
}
