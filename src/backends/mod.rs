//! Backend clients for hosted model providers
//!
//! Every provider implements [`Backend`]. The set of providers is closed and
//! identified by [`BackendId`]; the [`BackendRegistry`] is built once at startup
//! and shared by the router and the health monitor.

mod anthropic;
mod asksage;
mod http;
mod openai;
mod registry;

pub use anthropic::AnthropicBackend;
pub use asksage::AskSageBackend;
pub use http::{MAX_BACKOFF_MS, RetryPolicy, calculate_backoff};
pub use openai::OpenAiBackend;
pub use registry::BackendRegistry;

use crate::error::BackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifier of an integrated provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    AskSage,
    Anthropic,
    OpenAi,
}

impl BackendId {
    pub const ALL: [BackendId; 3] = [Self::AskSage, Self::Anthropic, Self::OpenAi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AskSage => "asksage",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::AskSage => "Ask Sage (FedRAMP High)",
            Self::Anthropic => "Anthropic Claude",
            Self::OpenAi => "OpenAI",
        }
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asksage" => Ok(Self::AskSage),
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!(
                "Unknown backend '{}'. Expected one of: asksage, anthropic, openai",
                other
            )),
        }
    }
}

/// A single model call
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub model: String,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub context: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input.saturating_add(self.output)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub content: String,
    pub model_id: String,
    pub tokens: TokenUsage,
    pub backend: BackendId,
}

/// Result of a liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub ok: bool,
    pub latency_ms: u64,
}

impl ProbeOutcome {
    pub fn failed(latency_ms: u64) -> Self {
        Self {
            ok: false,
            latency_ms,
        }
    }
}

/// Capability shared by every provider client
#[async_trait]
pub trait Backend: Send + Sync {
    fn id(&self) -> BackendId;

    fn display_name(&self) -> &str {
        self.id().display_name()
    }

    /// Whether this provider may receive content above UNCLASSIFIED
    fn is_compliance_authorized(&self) -> bool;

    /// Whether credentials are present
    fn is_configured(&self) -> bool;

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, BackendError>;

    /// Lightweight liveness check; never errors, failures report `ok = false`
    async fn probe(&self) -> ProbeOutcome;
}

/// Rough token estimate for providers that omit usage: ceil(chars / 4)
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}
