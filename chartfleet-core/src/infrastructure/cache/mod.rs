//! Key-value cache backends
//!
//! The orchestration layer persists its metadata in a shared key-value store.
//! [`KvStore`] is the byte-oriented contract; serialization belongs to the
//! store adapters built on top of it.

use async_trait::async_trait;

pub mod memory_cache;
pub mod redis_cache;

pub use memory_cache::MemoryKvStore;
pub use redis_cache::RedisKvStore;

/// Key-value cache errors.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("key not found: {key}")]
    NotFound { key: String },

    #[error("cache backend error: {0}")]
    Backend(String),
}

impl KvError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound { .. })
    }
}

/// Byte-oriented key-value storage interface.
///
/// Single-key reads and writes are consistent; no cross-key transactions are
/// offered or required.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value. A missing key is `KvError::NotFound`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, KvError>;

    /// Write a value, overwriting any previous one.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), KvError>;

    /// Delete a key. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// List all keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError>;
}
