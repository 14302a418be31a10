//! OpenAI chat completions client

use super::anthropic::user_content;
use super::http::{build_client, status_error, transport_error, with_retry};
use super::{Backend, BackendId, ProbeOutcome, QueryRequest, QueryResponse, TokenUsage, estimate_tokens};
use crate::config::BackendSettings;
use crate::error::BackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const FALLBACK_MODEL: &str = "gpt-4o";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}

pub struct OpenAiBackend {
    settings: BackendSettings,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(settings: BackendSettings, api_key: Option<String>) -> Self {
        let client = build_client(settings.query_timeout());
        Self {
            settings,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        }
    }

    /// Catalog models served by other providers map to the configured default
    fn resolve_model<'a>(&'a self, model: &'a str) -> &'a str {
        if model.starts_with("gpt-") || model.starts_with("o1") || model.starts_with("o3") {
            model
        } else {
            self.settings.default_model().unwrap_or(FALLBACK_MODEL)
        }
    }

    async fn query_once(&self, api_key: &str, request: &QueryRequest) -> Result<QueryResponse, BackendError> {
        let name = BackendId::OpenAi.as_str();
        let model = self.resolve_model(&request.model);
        let content = user_content(request);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &content,
        });

        let body = CompletionBody {
            model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.settings.base_url()))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(name, self.settings.query_timeout(), e))?;

        if !response.status().is_success() {
            return Err(status_error(name, response).await);
        }

        let reply: CompletionReply = response
            .json()
            .await
            .map_err(|e| transport_error(name, self.settings.query_timeout(), e))?;

        let text = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let usage = reply.usage;
        let tokens = TokenUsage {
            input: usage
                .as_ref()
                .and_then(|u| u.prompt_tokens)
                .unwrap_or_else(|| estimate_tokens(&request.prompt)),
            output: usage
                .as_ref()
                .and_then(|u| u.completion_tokens)
                .unwrap_or_else(|| estimate_tokens(&text)),
        };

        Ok(QueryResponse {
            content: text,
            model_id: reply.model.unwrap_or_else(|| model.to_string()),
            tokens,
            backend: BackendId::OpenAi,
        })
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn id(&self) -> BackendId {
        BackendId::OpenAi
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

    async fn probe(&self) -> ProbeOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return ProbeOutcome::failed(0);
        };

        let start = Instant::now();
        let result = self
            .client
            .get(format!("{}/models", self.settings.base_url()))
            .bearer_auth(api_key)
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
