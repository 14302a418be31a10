//! Key/value stores with optional TTL
//!
//! Circuit state, routing preferences and cached responses all persist through
//! the [`Store`] trait. [`TieredStore`] pairs a durable store with a
//! process-local map so that a store outage never blocks dispatch.

mod memory;
mod redis_store;
mod tiered;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use tiered::TieredStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation failed: {0}")]
    Operation(String),
}

impl From<StoreError> for crate::error::AppError {
    fn from(err: StoreError) -> Self {
        crate::error::AppError::Store(err.to_string())
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value`; `ttl = None` keeps it until deleted
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
