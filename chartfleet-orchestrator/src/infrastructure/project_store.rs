//! Project cache persistence over the shared key-value store

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use chartfleet_core::infrastructure::cache::KvStore;

use crate::domain::entities::ProjectCache;

/// Project cache persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum ProjectStoreError {
    #[error("project {namespace}/{name} is not found")]
    NotFound { namespace: String, name: String },

    #[error("failed to decode project cache: {0}")]
    Serialization(String),

    #[error("project store backend error: {0}")]
    Backend(String),
}

impl ProjectStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProjectStoreError::NotFound { .. })
    }
}

/// Project cache storage interface.
///
/// Consistent for single-key reads and writes; the single-flight invariant is
/// enforced by the manager, not here.
#[async_trait]
pub trait ProjectCacheStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<ProjectCache, ProjectStoreError>;
    async fn save(&self, cache: &ProjectCache) -> Result<(), ProjectStoreError>;
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ProjectStoreError>;
    async fn list(&self, namespace: &str) -> Result<Vec<ProjectCache>, ProjectStoreError>;
}

/// [`ProjectCacheStore`] over an arbitrary [`KvStore`], JSON-encoded.
pub struct KvProjectCacheStore {
    kv: Arc<dyn KvStore>,
}

impl KvProjectCacheStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn cache_key(namespace: &str, name: &str) -> String {
        format!("project:cache:{}:{}", namespace, name)
    }

    fn namespace_prefix(namespace: &str) -> String {
        format!("project:cache:{}:", namespace)
    }
}

#[async_trait]
impl ProjectCacheStore for KvProjectCacheStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<ProjectCache, ProjectStoreError> {
        let key = Self::cache_key(namespace, name);
        let bytes = self.kv.get(&key).await.map_err(|e| {
            if e.is_not_found() {
                ProjectStoreError::NotFound {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                }
            } else {
                ProjectStoreError::Backend(e.to_string())
            }
        })?;

        serde_json::from_slice(&bytes).map_err(|e| ProjectStoreError::Serialization(e.to_string()))
    }

    async fn save(&self, cache: &ProjectCache) -> Result<(), ProjectStoreError> {
        let key = Self::cache_key(&cache.namespace, &cache.name);
        let bytes = serde_json::to_vec(cache)
            .map_err(|e| ProjectStoreError::Serialization(e.to_string()))?;

        self.kv
            .set(&key, bytes)
            .await
            .map_err(|e| ProjectStoreError::Backend(e.to_string()))?;

        debug!(
            namespace = %cache.namespace,
            project = %cache.name,
            signature = %cache.latest_task_signature,
            "project cache saved"
        );
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ProjectStoreError> {
        self.kv
            .delete(&Self::cache_key(namespace, name))
            .await
            .map_err(|e| ProjectStoreError::Backend(e.to_string()))?;

        debug!(namespace = %namespace, project = %name, "project cache deleted");
        Ok(())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<ProjectCache>, ProjectStoreError> {
        let keys = self
            .kv
            .keys_with_prefix(&Self::namespace_prefix(namespace))
            .await
            .map_err(|e| ProjectStoreError::Backend(e.to_string()))?;

        let mut caches = Vec::with_capacity(keys.len());
        for key in keys {
            match self.kv.get(&key).await {
                Ok(bytes) => caches.push(
                    serde_json::from_slice(&bytes)
                        .map_err(|e| ProjectStoreError::Serialization(e.to_string()))?,
                ),
                // Deleted between the scan and the read.
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(ProjectStoreError::Backend(e.to_string())),
            }
        }
        Ok(caches)
    }
}
