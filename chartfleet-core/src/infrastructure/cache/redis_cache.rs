//! Redis-backed key-value store
//!
//! Production backend for the shared metadata cache. Works against any
//! Redis-compatible server.

use async_trait::async_trait;
use redis::Client;
use redis::aio::ConnectionManager;
use tracing::{debug, error};

use super::{KvError, KvStore};

/// Redis-backed [`KvStore`] implementation.
pub struct RedisKvStore {
    connection_manager: ConnectionManager,
}

impl RedisKvStore {
    /// Connect to a Redis-compatible server and verify the connection with a
    /// PING before returning.
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = Client::open(url).map_err(|e| {
            error!("failed to create redis client: {}", e);
            KvError::Backend(format!("failed to create redis client: {}", e))
        })?;

        let connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("failed to establish redis connection: {}", e);
            KvError::Backend(format!("failed to establish redis connection: {}", e))
        })?;

        let mut conn = connection_manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| {
                error!("failed to ping redis: {}", e);
                KvError::Backend(format!("failed to ping redis: {}", e))
            })?;

        debug!("connected to redis at {}", url);
        Ok(Self { connection_manager })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, KvError> {
        let mut conn = self.connection_manager.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;

        value.ok_or_else(|| KvError::NotFound {
            key: key.to_string(),
        })
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), KvError> {
        let mut conn = self.connection_manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.connection_manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        // SCAN cursor loop; KEYS would block the server on large keyspaces.
        let mut conn = self.connection_manager.clone();
        let pattern = format!("{}*", prefix);
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| KvError::Backend(e.to_string()))?;

            keys.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }
}
