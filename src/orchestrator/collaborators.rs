//! Narrow interfaces to the systems the pipeline depends on
//!
//! Identity, access control, token allotments, the response cache and usage
//! logging live outside the dispatch core. The binary wires the local
//! implementations from [`super::local`]; tests substitute mocks.

use super::envelope::Confidence;
use crate::backends::BackendId;
use crate::classification::SensitivityLevel;
use crate::error::AppResult;
use crate::models::TaskCategory;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Role and company context of an authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallerProfile {
    pub caller_id: String,
    /// `None` for callers outside any billing context; the token gate is skipped
    pub company_id: Option<String>,
    pub role: String,
}

#[async_trait]
pub trait CallerResolver: Send + Sync {
    /// Resolve a bearer token to a caller id
    ///
    /// # Errors
    /// `Unauthenticated` when the token is missing or unknown.
    async fn authenticate(&self, token: Option<&str>) -> AppResult<String>;

    /// Role and company for an authenticated caller
    async fn profile(&self, caller_id: &str) -> AppResult<CallerProfile>;
}

#[async_trait]
pub trait AccessPolicy: Send + Sync {
    /// Tasks any authenticated caller may run regardless of role
    fn is_ungated(&self, task: &TaskCategory) -> bool;

    async fn allowed_tasks(&self, role: &str) -> AppResult<HashSet<TaskCategory>>;
}

/// Result of a token allotment check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub allowed: bool,
    /// Human-readable notice; always present when `allowed` is false
    pub message: Option<String>,
}

impl GateDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            message: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            allowed: true,
            message: Some(message.into()),
        }
    }

    pub fn block(message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            message: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait TokenGate: Send + Sync {
    async fn check(&self, company_id: &str, correlation_id: Option<&str>) -> AppResult<GateDecision>;

    async fn debit(&self, company_id: &str, tokens: u64) -> AppResult<()>;
}

/// Everything that distinguishes one cacheable response from another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub company_id: Option<String>,
    pub prompt: String,
    pub model_id: String,
    pub sensitivity: SensitivityLevel,
    pub task: TaskCategory,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry {
    pub content: String,
    pub model_used: String,
    pub confidence: Confidence,
    pub cached_at: DateTime<Utc>,
}

#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<CachedEntry>>;

    async fn put(&self, key: &CacheKey, entry: CachedEntry) -> AppResult<()>;
}

/// Metadata attached to each usage record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageMetadata {
    pub model: String,
    pub backend: BackendId,
    pub sensitivity: SensitivityLevel,
    pub latency_ms: u64,
    pub cache_hit: bool,
}

/// One billable dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub task: TaskCategory,
    pub caller_id: String,
    pub company_id: Option<String>,
    pub correlation_id: Option<String>,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub estimated_cost_usd: f64,
    pub created_at: DateTime<Utc>,
    pub metadata: UsageMetadata,
}

#[async_trait]
pub trait UsageLogger: Send + Sync {
    async fn record(&self, record: UsageRecord) -> AppResult<()>;
}
