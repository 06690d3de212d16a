//! In-process cache storage.

use std::collections::HashMap;

use async_lock::RwLock;
use async_trait::async_trait;

use crate::cache::CacheStorage;
use crate::error::CacheError;
use crate::http::response::RawResponse;

/// [`CacheStorage`] kept in memory: cache name → (URL → response).
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    stores: RwLock<HashMap<String, HashMap<String, RawResponse>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all stores that currently exist.
    pub async fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn match_entry(
        &self,
        cache_name: &str,
        url: &str,
    ) -> Result<Option<RawResponse>, CacheError> {
        Ok(self
            .stores
            .read()
            .await
            .get(cache_name)
            .and_then(|store| store.get(url))
            .cloned())
    }

    async fn put(
        &self,
        cache_name: &str,
        url: &str,
        response: RawResponse,
    ) -> Result<(), CacheError> {
        self.stores
            .write()
            .await
            .entry(cache_name.to_string())
            .or_default()
            .insert(url.to_string(), response);
        Ok(())
    }

    async fn delete(&self, cache_name: &str, url: &str) -> Result<bool, CacheError> {
        Ok(self
            .stores
            .write()
            .await
            .get_mut(cache_name)
            .map(|store| store.remove(url).is_some())
            .unwrap_or(false))
    }

    async fn delete_cache(&self, cache_name: &str) -> Result<bool, CacheError> {
        Ok(self.stores.write().await.remove(cache_name).is_some())
    }

    async fn keys(&self, cache_name: &str) -> Result<Vec<String>, CacheError> {
        let mut keys: Vec<String> = self
            .stores
            .read()
            .await
            .get(cache_name)
            .map(|store| store.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}
