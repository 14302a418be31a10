//! Static model catalog and task-to-model mapping

use crate::backends::BackendId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::str::FromStr;

/// Catalog key for a model configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKey {
    ClaudeHaiku,
    ClaudeSonnet,
    ClaudeOpus,
    #[serde(rename = "gpt-4o")]
    Gpt4o,
}

impl ModelKey {
    pub const ALL: [ModelKey; 4] = [
        Self::ClaudeHaiku,
        Self::ClaudeSonnet,
        Self::ClaudeOpus,
        Self::Gpt4o,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaudeHaiku => "claude-haiku",
            Self::ClaudeSonnet => "claude-sonnet",
            Self::ClaudeOpus => "claude-opus",
            Self::Gpt4o => "gpt-4o",
        }
    }
}

impl std::fmt::Display for ModelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable catalog entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    pub model_id: String,
    pub backend: BackendId,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Blended USD rate per 1,000 tokens (input and output alike)
    pub cost_per_1k: f64,
}

impl ModelConfig {
    /// Same backend and same model
    pub fn same_target(&self, other: &ModelConfig) -> bool {
        self.backend == other.backend && self.model_id == other.model_id
    }

    /// Estimated USD cost of `tokens` at this model's blended rate
    pub fn estimate_cost(&self, tokens: u32) -> f64 {
        f64::from(tokens) / 1000.0 * self.cost_per_1k
    }
}

/// Category of work a caller asks for
///
/// Unknown names are kept as [`TaskCategory::Other`] so selection can fall
/// back to the default mapping instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskCategory {
    Chat,
    Strategy,
    Compliance,
    Capture,
    Writer,
    Contracts,
    Orals,
    Pricing,
    Summarize,
    Classify,
    Other(String),
}

impl TaskCategory {
    pub const KNOWN: [TaskCategory; 10] = [
        Self::Chat,
        Self::Strategy,
        Self::Compliance,
        Self::Capture,
        Self::Writer,
        Self::Contracts,
        Self::Orals,
        Self::Pricing,
        Self::Summarize,
        Self::Classify,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Chat => "chat",
            Self::Strategy => "strategy",
            Self::Compliance => "compliance",
            Self::Capture => "capture",
            Self::Writer => "writer",
            Self::Contracts => "contracts",
            Self::Orals => "orals",
            Self::Pricing => "pricing",
            Self::Summarize => "summarize",
            Self::Classify => "classify",
            Self::Other(name) => name,
        }
    }

    /// (primary, fallback) keys; `None` for tasks without their own mapping
    pub fn mapping(&self) -> Option<(ModelKey, ModelKey)> {
        use ModelKey::*;
        let pair = match self {
            Self::Chat => (ClaudeSonnet, ClaudeHaiku),
            Self::Strategy => (ClaudeOpus, ClaudeSonnet),
            Self::Compliance => (ClaudeSonnet, ClaudeHaiku),
            Self::Capture => (ClaudeSonnet, ClaudeHaiku),
            Self::Writer => (ClaudeOpus, ClaudeSonnet),
            Self::Contracts => (ClaudeSonnet, ClaudeHaiku),
            Self::Orals => (ClaudeOpus, ClaudeSonnet),
            Self::Pricing => (Gpt4o, ClaudeSonnet),
            Self::Summarize => (ClaudeHaiku, ClaudeHaiku),
            Self::Classify => (ClaudeHaiku, ClaudeHaiku),
            Self::Other(_) => return None,
        };
        Some(pair)
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Ok(Self::KNOWN
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .unwrap_or(Self::Other(normalized)))
    }
}

impl Serialize for TaskCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let Ok(task) = raw.parse::<TaskCategory>();
        Ok(task)
    }
}

/// Task whose mapping stands in for unrecognized tasks
pub const DEFAULT_TASK: TaskCategory = TaskCategory::Chat;

/// The model catalog
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    entries: HashMap<ModelKey, ModelConfig>,
}

impl ModelCatalog {
    /// The production catalog; every model is served through Ask Sage
    pub fn standard() -> Self {
        let entry = |model_id: &str, max_tokens, temperature, cost_per_1k| ModelConfig {
            model_id: model_id.to_string(),
            backend: BackendId::AskSage,
            max_tokens,
            temperature,
            cost_per_1k,
        };

        Self {
            entries: HashMap::from([
                (
                    ModelKey::ClaudeHaiku,
                    entry("claude-haiku-4-5", 4096, 0.3, 0.00025),
                ),
                (
                    ModelKey::ClaudeSonnet,
                    entry("claude-sonnet-4-5", 8192, 0.5, 0.003),
                ),
                (ModelKey::ClaudeOpus, entry("claude-opus-4", 8192, 0.7, 0.015)),
                (ModelKey::Gpt4o, entry("gpt-4o", 4096, 0.5, 0.005)),
            ]),
        }
    }

    /// Catalog with arbitrary entries; every [`ModelKey`] must be present
    pub fn from_entries(entries: HashMap<ModelKey, ModelConfig>) -> Result<Self, String> {
        if let Some(missing) = ModelKey::ALL.iter().find(|k| !entries.contains_key(*k)) {
            return Err(format!("model catalog is missing '{}'", missing));
        }
        Ok(Self { entries })
    }

    pub fn get(&self, key: ModelKey) -> &ModelConfig {
        // from_entries and standard guarantee every key is present
        &self.entries[&key]
    }

    /// Key with the lowest blended rate (ties broken by catalog order)
    pub fn cheapest(&self) -> ModelKey {
        ModelKey::ALL
            .into_iter()
            .min_by(|a, b| {
                self.get(*a)
                    .cost_per_1k
                    .total_cmp(&self.get(*b).cost_per_1k)
            })
            .unwrap_or(ModelKey::ClaudeHaiku)
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
