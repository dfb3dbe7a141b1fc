//! Credential cache
//!
//! Key-value storage with TTL that acts as the revocation ledger for issued
//! token uuids and holds the read-through user snapshots. Any failure to reach
//! the backing store is surfaced as an error; callers must never read a cache
//! error as "not revoked".

#[cfg(any(test, feature = "test-util"))]
mod memory;
mod redis_store;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[cfg(any(test, feature = "test-util"))]
pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Cache errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Key not found")]
    NotFound,

    #[error("Cache operation timed out")]
    Timeout,

    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache value could not be (de)serialized: {0}")]
    Serialization(String),
}

/// Raw key-value backend
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store `value` under `key`; a TTL of zero means no expiry
    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> Result<(), CacheError>;

    /// Fetch the value under `key`, `None` if absent
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Remove `keys`, returning how many existed
    async fn del(&self, keys: &[String]) -> Result<u64, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

/// Semantic wrapper over a [`KeyValueStore`] with per-call deadlines and
/// structured value (de)serialization
#[derive(Clone)]
pub struct CredentialCache {
    store: Arc<dyn KeyValueStore>,
    timeout: Duration,
}

impl CredentialCache {
    pub fn new(store: Arc<dyn KeyValueStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn set(
        &self,
        key: &str,
        value: impl ToString,
        ttl_seconds: u64,
    ) -> Result<(), CacheError> {
        self.bounded(self.store.set(key, value.to_string(), ttl_seconds))
            .await
    }

    pub async fn set_struct<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: u64,
    ) -> Result<(), CacheError> {
        let json =
            serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.bounded(self.store.set(key, json, ttl_seconds)).await
    }

    pub async fn get(&self, key: &str) -> Result<String, CacheError> {
        self.bounded(self.store.get(key))
            .await?
            .ok_or(CacheError::NotFound)
    }

    pub async fn get_struct<T: DeserializeOwned>(&self, key: &str) -> Result<T, CacheError> {
        let json = self.get(key).await?;
        serde_json::from_str(&json).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// Delete one or more keys, returning how many were live. Absent keys are
    /// not an error.
    pub async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = self.bounded(self.store.del(keys)).await?;
        tracing::debug!(requested = keys.len(), removed, "cache keys deleted");
        Ok(removed)
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        self.bounded(self.store.ping()).await
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "cache call timed out");
                Err(CacheError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Profile {
        id: i64,
        name: String,
    }

    fn cache(store: Arc<MemoryStore>) -> CredentialCache {
        CredentialCache::new(store, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_scalar_roundtrip() {
        let cache = cache(Arc::new(MemoryStore::new()));
        cache.set("access:abc", 7, 60).await.unwrap();
        assert_eq!(cache.get("access:abc").await.unwrap(), "7");
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let cache = cache(Arc::new(MemoryStore::new()));
        assert_eq!(cache.get("nope").await.unwrap_err(), CacheError::NotFound);
    }

    #[tokio::test]
    async fn test_struct_value() {
        let cache = cache(Arc::new(MemoryStore::new()));
        let profile = Profile {
            id: 1,
            name: "Ada".to_string(),
        };
        cache.set_struct("user:1", &profile, 0).await.unwrap();

        let cached: Profile = cache.get_struct("user:1").await.unwrap();
        assert_eq!(cached, profile);
    }

    #[tokio::test]
    async fn test_corrupt_struct_value() {
        let cache = cache(Arc::new(MemoryStore::new()));
        cache.set("user:1", "not json", 0).await.unwrap();

        let result = cache.get_struct::<Profile>("user:1").await;
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_del_is_idempotent() {
        let cache = cache(Arc::new(MemoryStore::new()));
        cache.set("a", 1, 0).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string()];
        assert_eq!(cache.del(&keys).await.unwrap(), 1);
        assert_eq!(cache.del(&keys).await.unwrap(), 0);
        assert_eq!(cache.get("a").await.unwrap_err(), CacheError::NotFound);
    }

    #[tokio::test]
    async fn test_outage_fails_closed() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache(store.clone());
        cache.set("access:abc", 7, 60).await.unwrap();

        store.set_available(false);
        assert!(matches!(
            cache.get("access:abc").await,
            Err(CacheError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let store = Arc::new(MemoryStore::new());
        store.set_latency(Duration::from_millis(500));
        let cache = CredentialCache::new(store, Duration::from_millis(20));

        assert_eq!(cache.get("any").await.unwrap_err(), CacheError::Timeout);
    }
}
