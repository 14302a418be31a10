//! Anthropic Messages API client

use super::http::{build_client, status_error, transport_error, with_retry};
use super::{Backend, BackendId, ProbeOutcome, QueryRequest, QueryResponse, TokenUsage, estimate_tokens};
use crate::config::BackendSettings;
use crate::error::BackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const PROBE_MODEL: &str = "claude-haiku-4-5-20251001";

const FALLBACK_MODEL: &str = "claude-sonnet-4-5-20250514";

/// Generic catalog model names to dated provider identifiers
///
/// Models from other providers (after a failover) map to `default_model`.
fn resolve_model<'a>(model: &'a str, default_model: Option<&'a str>) -> &'a str {
    match model {
        "claude-haiku-4-5" => "claude-haiku-4-5-20251001",
        "claude-sonnet-4-5" => "claude-sonnet-4-5-20250514",
        "claude-opus-4" => "claude-opus-4-20250514",
        other if other.starts_with("claude") => other,
        _ => default_model.unwrap_or(FALLBACK_MODEL),
    }
}

/// User turn text, with context prepended when present
pub(crate) fn user_content(request: &QueryRequest) -> String {
    match request.context.as_deref() {
        Some(ctx) if !ctx.is_empty() => format!("Context:\n{}\n\n{}", ctx, request.prompt),
        _ => request.prompt.clone(),
    }
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Deserialize)]
struct MessagesReply {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
}

pub struct AnthropicBackend {
    settings: BackendSettings,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(settings: BackendSettings, api_key: Option<String>) -> Self {
        let client = build_client(settings.query_timeout());
        Self {
            settings,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        }
    }

    fn messages_request(&self, api_key: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/messages", self.settings.base_url()))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }

    async fn query_once(&self, api_key: &str, request: &QueryRequest) -> Result<QueryResponse, BackendError> {
        let name = BackendId::Anthropic.as_str();
        let model = resolve_model(&request.model, self.settings.default_model());
        let content = user_content(request);
        let body = MessagesBody {
            model,
            max_tokens: request.max_tokens,
            temperature: Some(request.temperature),
            system: request.system_prompt.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &content,
            }],
        };

        let response = self
            .messages_request(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(name, self.settings.query_timeout(), e))?;

        if !response.status().is_success() {
            return Err(status_error(name, response).await);
        }

        let reply: MessagesReply = response
            .json()
            .await
            .map_err(|e| transport_error(name, self.settings.query_timeout(), e))?;

        let text: String = reply
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text.as_deref())
            .collect();

        let usage = reply.usage;
        let tokens = TokenUsage {
            input: usage
                .as_ref()
                .and_then(|u| u.input_tokens)
                .unwrap_or_else(|| estimate_tokens(&request.prompt)),
            output: usage
                .as_ref()
                .and_then(|u| u.output_tokens)
                .unwrap_or_else(|| estimate_tokens(&text)),
        };

        Ok(QueryResponse {
            content: text,
            model_id: reply.model.unwrap_or_else(|| model.to_string()),
            tokens,
            backend: BackendId::Anthropic,
        })
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn id(&self) -> BackendId {
        BackendId::Anthropic
    }

    fn is_compliance_authorized(&self) -> bool {
        false
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, BackendError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(BackendError::NotConfigured {
                backend: self.id().to_string(),
            });
        };

        let policy = self.settings.retry_policy();
        with_retry(self.id().as_str(), &policy, || self.query_once(api_key, request)).await
    }

    /// A one-token completion; there is no dedicated health endpoint
    async fn probe(&self) -> ProbeOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return ProbeOutcome::failed(0);
        };

        let body = MessagesBody {
            model: PROBE_MODEL,
            max_tokens: 1,
            temperature: None,
            system: None,
            messages: vec![Message {
                role: "user",
                content: "ping",
            }],
        };

        let start = Instant::now();
        let result = self
            .messages_request(api_key)
            .json(&body)
            .timeout(self.settings.probe_timeout())
            .send()
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        ProbeOutcome {
            ok: matches!(result, Ok(ref r) if r.status().is_success()),
            latency_ms,
        }
    }
}
