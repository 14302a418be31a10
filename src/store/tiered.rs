use super::{MemoryStore, Store, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Durable store with a process-local safety net
///
/// Reads prefer the durable store and fall back to the local copy on any
/// durable error. Writes always land in the local copy, whether or not the
/// durable write succeeded; durable write errors are logged, not returned.
pub struct TieredStore {
    durable: Option<Arc<dyn Store>>,
    local: MemoryStore,
}

impl TieredStore {
    pub fn new(durable: Arc<dyn Store>) -> Self {
        Self {
            durable: Some(durable),
            local: MemoryStore::new(),
        }
    }

    /// Local-only store, used when no durable backend is configured
    pub fn local_only() -> Self {
        Self {
            durable: None,
            local: MemoryStore::new(),
        }
    }

    pub fn has_durable(&self) -> bool {
        self.durable.is_some()
    }
}

#[async_trait]
impl Store for TieredStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(durable) = &self.durable {
            match durable.get(key).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "Durable store read failed, using local copy");
                }
            }
        }
        self.local.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        if let Some(durable) = &self.durable
            && let Err(e) = durable.set(key, value, ttl).await
        {
            tracing::warn!(key = %key, error = %e, "Durable store write failed, kept local copy only");
        }
        self.local.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if let Some(durable) = &self.durable
            && let Err(e) = durable.delete(key).await
        {
            tracing::warn!(key = %key, error = %e, "Durable store delete failed");
        }
        self.local.delete(key).await
    }
}
