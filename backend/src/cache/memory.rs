//! In-process key-value store for tests
//!
//! Honors TTLs like Redis does and can be switched into failure modes. Only
//! compiled for unit tests and under the `test-util` feature.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{CacheError, KeyValueStore};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
    fail_deletes: AtomicBool,
    failing_set_prefix: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) the connection to the store
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make every `set` on a key starting with `prefix` fail
    pub fn fail_sets_with_prefix(&self, prefix: Option<&str>) {
        *self.lock_prefix() = prefix.map(str::to_string);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Whether `key` currently holds a live value
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock_entries()
            .get(key)
            .is_some_and(|entry| entry.is_live(now))
    }

    /// Live value under `key`, bypassing failure modes
    pub fn peek(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.lock_entries()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Remaining lifetime of `key`; `None` if absent or stored without expiry
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.lock_entries()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Live keys starting with `prefix`
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .lock_entries()
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    async fn enter(&self) -> Result<(), CacheError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the lock cannot leave an entry half-written
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_prefix(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.failing_set_prefix
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> Result<(), CacheError> {
        self.enter().await?;

        if let Some(prefix) = self.lock_prefix().as_deref() {
            if key.starts_with(prefix) {
                return Err(CacheError::Unavailable(format!("write rejected for {}", key)));
            }
        }

        let expires_at =
            (ttl_seconds > 0).then(|| Instant::now() + Duration::from_secs(ttl_seconds));
        self.lock_entries()
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.enter().await?;

        let now = Instant::now();
        let mut entries = self.lock_entries();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        self.enter().await?;

        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("delete rejected".to_string()));
        }

        let now = Instant::now();
        let mut entries = self.lock_entries();
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|entry| entry.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.enter().await
    }
}
