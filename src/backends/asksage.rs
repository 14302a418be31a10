//! Ask Sage client (FedRAMP High, compliance-authorized)

use super::http::{build_client, status_error, transport_error, with_retry};
use super::{Backend, BackendId, ProbeOutcome, QueryRequest, QueryResponse, TokenUsage, estimate_tokens};
use crate::config::BackendSettings;
use crate::error::BackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    model: &'a str,
    prompt: &'a str,
    system_prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    context: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryReply {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    tokens_used: Option<ReplyUsage>,
}

#[derive(Debug, Deserialize)]
struct ReplyUsage {
    #[serde(default)]
    input: Option<u32>,
    #[serde(default)]
    output: Option<u32>,
}

pub struct AskSageBackend {
    settings: BackendSettings,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl AskSageBackend {
    pub fn new(settings: BackendSettings, api_key: Option<String>) -> Self {
        let client = build_client(settings.query_timeout());
        Self {
            settings,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        }
    }

    async fn query_once(&self, api_key: &str, request: &QueryRequest) -> Result<QueryResponse, BackendError> {
        let name = BackendId::AskSage.as_str();
        let body = QueryBody {
            model: &request.model,
            prompt: &request.prompt,
            system_prompt: request.system_prompt.as_deref().unwrap_or(""),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            context: request.context.as_deref().unwrap_or(""),
        };

        let response = self
            .client
            .post(format!("{}/query", self.settings.base_url()))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(name, self.settings.query_timeout(), e))?;

        if !response.status().is_success() {
            return Err(status_error(name, response).await);
        }

        let reply: QueryReply = response
            .json()
            .await
            .map_err(|e| transport_error(name, self.settings.query_timeout(), e))?;

        let content = reply.response.or(reply.content).unwrap_or_default();
        let usage = reply.tokens_used;
        let tokens = TokenUsage {
            input: usage
                .as_ref()
                .and_then(|u| u.input)
                .unwrap_or_else(|| estimate_tokens(&request.prompt)),
            output: usage
                .as_ref()
                .and_then(|u| u.output)
                .unwrap_or_else(|| estimate_tokens(&content)),
        };

        Ok(QueryResponse {
            content,
            model_id: reply.model.unwrap_or_else(|| request.model.clone()),
            tokens,
            backend: BackendId::AskSage,
        })
    }
}

#[async_trait]
impl Backend for AskSageBackend {
    fn id(&self) -> BackendId {
        BackendId::AskSage
    }

    fn is_compliance_authorized(&self) -> bool {
        true
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
            .get(format!("{}/health", self.settings.base_url()))
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
