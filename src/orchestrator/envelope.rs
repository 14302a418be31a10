//! Caller-facing request and response types

use crate::classification::SensitivityLevel;
use crate::models::{DEFAULT_TASK, TaskCategory};
use serde::{Deserialize, Deserializer, Serialize};

/// Maximum prompt length in characters
pub const MAX_PROMPT_LENGTH: usize = 100_000;

/// Placeholder for `model_used`/`backend_used` when no live backend answered
pub const NO_BACKEND: &str = "none";

/// `backend_used` for responses served from the cache
pub const CACHE_BACKEND: &str = "cache";

pub const UNAVAILABLE_MESSAGE: &str =
    "AI processing is currently unavailable. Please try again later or complete this task manually.";

/// One dispatch request
///
/// Validated while deserializing: the prompt must be non-blank and at most
/// [`MAX_PROMPT_LENGTH`] characters, temperature within [0, 2], max_tokens
/// positive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestOptions {
    pub task: TaskCategory,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub context: Option<String>,
    /// Overrides the selected model's default
    pub max_tokens: Option<u32>,
    /// Overrides the selected model's default
    pub temperature: Option<f32>,
    /// Opportunity or workflow id carried into usage records
    pub correlation_id: Option<String>,
}

impl RequestOptions {
    pub fn new(task: TaskCategory, prompt: impl Into<String>) -> Self {
        Self {
            task,
            prompt: prompt.into(),
            system_prompt: None,
            context: None,
            max_tokens: None,
            temperature: None,
            correlation_id: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

impl<'de> Deserialize<'de> for RequestOptions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawRequestOptions {
            #[serde(default)]
            task: Option<TaskCategory>,
            prompt: String,
            #[serde(default)]
            system_prompt: Option<String>,
            #[serde(default)]
            context: Option<String>,
            #[serde(default)]
            max_tokens: Option<u32>,
            #[serde(default)]
            temperature: Option<f32>,
            #[serde(default)]
            correlation_id: Option<String>,
        }

        let raw = RawRequestOptions::deserialize(deserializer)?;

        if raw.prompt.trim().is_empty() {
            return Err(serde::de::Error::custom(
                "prompt cannot be empty or contain only whitespace",
            ));
        }

        let char_count = raw.prompt.chars().count();
        if char_count > MAX_PROMPT_LENGTH {
            return Err(serde::de::Error::custom(format!(
                "prompt exceeds maximum length of {} characters (got {})",
                MAX_PROMPT_LENGTH, char_count
            )));
        }

        if let Some(t) = raw.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(serde::de::Error::custom(format!(
                "temperature must be between 0 and 2 (got {})",
                t
            )));
        }

        if raw.max_tokens == Some(0) {
            return Err(serde::de::Error::custom("max_tokens must be greater than 0"));
        }

        Ok(RequestOptions {
            task: raw.task.unwrap_or(DEFAULT_TASK),
            prompt: raw.prompt,
            system_prompt: raw.system_prompt,
            context: raw.context,
            max_tokens: raw.max_tokens,
            temperature: raw.temperature,
            correlation_id: raw.correlation_id,
        })
    }
}

/// Heuristic quality tier of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// Short or hedging answers are low, long answers high, everything else medium
pub fn infer_confidence(content: &str) -> Confidence {
    let len = content.chars().count();
    let lowered = content.to_lowercase();
    if len < 50 || lowered.contains("not sure") || lowered.contains("unclear") {
        Confidence::Low
    } else if len > 500 {
        Confidence::High
    } else {
        Confidence::Medium
    }
}

/// Uniform dispatch result, fully populated on every path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub content: String,
    pub model_used: String,
    pub backend_used: String,
    pub confidence: Confidence,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub latency_ms: u64,
    pub sensitivity: SensitivityLevel,
    pub cached: bool,
}

impl ResponseEnvelope {
    /// Envelope for a request no backend served
    pub fn degraded(message: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            content: message.into(),
            model_used: NO_BACKEND.to_string(),
            backend_used: NO_BACKEND.to_string(),
            confidence: Confidence::Low,
            tokens_in: 0,
            tokens_out: 0,
            latency_ms,
            sensitivity: SensitivityLevel::Unclassified,
            cached: false,
        }
    }

    pub fn unavailable(latency_ms: u64) -> Self {
        Self::degraded(UNAVAILABLE_MESSAGE, latency_ms)
    }

    /// Whether a live backend or the cache produced this envelope
    pub fn is_degraded(&self) -> bool {
        self.backend_used == NO_BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_confidence() {
        assert_eq!(infer_confidence("Too short."), Confidence::Low);
        assert_eq!(
            infer_confidence(&format!("{} but I am not sure about it.", "x".repeat(60))),
            Confidence::Low
        );
        assert_eq!(
            infer_confidence(&format!("The answer is UNCLEAR. {}", "x".repeat(600))),
            Confidence::Low
        );
        assert_eq!(infer_confidence(&"a".repeat(501)), Confidence::High);
        assert_eq!(infer_confidence(&"a".repeat(200)), Confidence::Medium);
    }

    #[test]
    fn test_request_options_defaults() {
        let options: RequestOptions = serde_json::from_str(r#"{"prompt": "Summarize"}"#).unwrap();
        assert_eq!(options.task, DEFAULT_TASK);
        assert!(options.max_tokens.is_none());

        let options: RequestOptions =
            serde_json::from_str(r#"{"task": "pricing", "prompt": "Rates", "temperature": 0.2}"#)
                .unwrap();
        assert_eq!(options.task, TaskCategory::Pricing);
        assert_eq!(options.temperature, Some(0.2));
    }

    #[test]
    fn test_request_options_validation() {
        let cases = [
            r#"{"prompt": "   "}"#,
            r#"{"prompt": "ok", "temperature": 2.5}"#,
            r#"{"prompt": "ok", "temperature": -0.1}"#,
            r#"{"prompt": "ok", "max_tokens": 0}"#,
        ];
        for body in cases {
            assert!(
                serde_json::from_str::<RequestOptions>(body).is_err(),
                "should reject {}",
                body
            );
        }

        let long = format!(r#"{{"prompt": "{}"}}"#, "a".repeat(MAX_PROMPT_LENGTH + 1));
        let err = serde_json::from_str::<RequestOptions>(&long).unwrap_err();
        assert!(err.to_string().contains("maximum length"));
    }

    #[test]
    fn test_degraded_envelope_shape() {
        let env = ResponseEnvelope::unavailable(12);
        assert_eq!(env.content, UNAVAILABLE_MESSAGE);
        assert_eq!(env.model_used, "none");
        assert_eq!(env.backend_used, "none");
        assert_eq!(env.confidence, Confidence::Low);
        assert_eq!((env.tokens_in, env.tokens_out), (0, 0));
        assert_eq!(env.sensitivity, SensitivityLevel::Unclassified);
        assert!(env.is_degraded());

        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["confidence"], "low");
        assert_eq!(json["sensitivity"], "UNCLASSIFIED");
    }
}
