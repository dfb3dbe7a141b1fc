//! Redis-backed key-value store

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use super::{CacheError, KeyValueStore};

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Unavailable(e.to_string())
    }
}

/// Key-value store over one multiplexed Redis connection.
///
/// The connection is opened once and cloned per call. No reconnection or
/// retry happens here, so a broken connection surfaces as
/// [`CacheError::Unavailable`].
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    /// Open a connection to `url` and verify the server answers
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        let store = Self { connection };
        store.ping().await?;
        Ok(store)
    }

    fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> Result<(), CacheError> {
        let mut conn = self.connection();

        if ttl_seconds == 0 {
            let _: () = conn.set(key, value).await?;
        } else {
            let _: () = conn.set_ex(key, value, ttl_seconds).await?;
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        let mut conn = self.connection();
        let removed: u64 = conn.del(keys.to_vec()).await?;
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
