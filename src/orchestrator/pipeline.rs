//! The dispatch pipeline
//!
//! Access control failures are returned to the caller as errors. Everything
//! after the access gates either produces a served envelope or is logged with
//! its error kind and converted into the degraded envelope.

use super::best_effort::best_effort;
use super::collaborators::{
    AccessPolicy, CacheKey, CachedEntry, CallerProfile, CallerResolver, ResponseCache, TokenGate,
    UsageLogger, UsageMetadata, UsageRecord,
};
use super::envelope::{
    CACHE_BACKEND, RequestOptions, ResponseEnvelope, UNAVAILABLE_MESSAGE, infer_confidence,
};
use crate::backends::QueryRequest;
use crate::classification::{ClassificationEngine, SensitivityLevel};
use crate::error::{AppError, AppResult, ErrorKind};
use crate::health::HealthMonitor;
use crate::metrics::{Metrics, Operation, Outcome};
use crate::models::{ModelSelector, TaskCategory};
use crate::routing::{BackendAttempt, ProviderRouter};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Default bound on routed execution
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(60);

/// External systems the pipeline consults
#[derive(Clone)]
pub struct Collaborators {
    pub callers: Arc<dyn CallerResolver>,
    pub access: Arc<dyn AccessPolicy>,
    pub gate: Arc<dyn TokenGate>,
    pub cache: Arc<dyn ResponseCache>,
    pub usage: Arc<dyn UsageLogger>,
}

/// Single entry point for dispatch requests
pub struct Orchestrator {
    collaborators: Collaborators,
    engine: Arc<ClassificationEngine>,
    selector: Arc<ModelSelector>,
    router: Arc<ProviderRouter>,
    health: Option<Arc<HealthMonitor>>,
    metrics: Option<Arc<Metrics>>,
    cache_enabled: bool,
    deadline: Duration,
}

impl Orchestrator {
    pub fn new(
        collaborators: Collaborators,
        engine: Arc<ClassificationEngine>,
        selector: Arc<ModelSelector>,
        router: Arc<ProviderRouter>,
    ) -> Self {
        Self {
            collaborators,
            engine,
            selector,
            router,
            health: None,
            metrics: None,
            cache_enabled: true,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Feed every backend attempt into the circuit breaker
    pub fn with_health(mut self, health: Arc<HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn engine(&self) -> &ClassificationEngine {
        &self.engine
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    /// Resolve a bearer token to the caller's profile
    ///
    /// # Errors
    /// `Unauthenticated` for missing or unknown tokens; profile lookup failures
    /// propagate unchanged.
    pub async fn authenticate(&self, token: Option<&str>) -> AppResult<CallerProfile> {
        let caller_id = self.collaborators.callers.authenticate(token).await?;
        self.collaborators.callers.profile(&caller_id).await
    }

    /// Check the caller's role against the task's access gate
    pub async fn authorize(&self, profile: &CallerProfile, task: &TaskCategory) -> AppResult<()> {
        if self.collaborators.access.is_ungated(task) {
            return Ok(());
        }

        let allowed = self.collaborators.access.allowed_tasks(&profile.role).await?;
        if allowed.contains(task) {
            Ok(())
        } else {
            tracing::info!(
                caller_id = %profile.caller_id,
                role = %profile.role,
                task = %task,
                "Agent access denied"
            );
            Err(AppError::Forbidden {
                role: profile.role.clone(),
                task: task.to_string(),
            })
        }
    }

    pub async fn handle(
        &self,
        token: Option<&str>,
        options: RequestOptions,
    ) -> AppResult<ResponseEnvelope> {
        self.handle_cancellable(token, options, &CancellationToken::new())
            .await
    }

    /// Dispatch one request, honoring caller cancellation
    ///
    /// # Errors
    /// Only authentication and authorization failures are returned as errors.
    /// Every later failure, including cancellation, yields a degraded envelope.
    pub async fn handle_cancellable(
        &self,
        token: Option<&str>,
        options: RequestOptions,
        cancel: &CancellationToken,
    ) -> AppResult<ResponseEnvelope> {
        let start = Instant::now();
        let profile = self.authenticate(token).await?;
        self.authorize(&profile, &options.task).await?;

        if let Some(company_id) = profile.company_id.as_deref() {
            match self
                .collaborators
                .gate
                .check(company_id, options.correlation_id.as_deref())
                .await
            {
                Ok(decision) if !decision.allowed => {
                    let message = decision
                        .message
                        .unwrap_or_else(|| UNAVAILABLE_MESSAGE.to_string());
                    tracing::info!(
                        caller_id = %profile.caller_id,
                        company_id = %company_id,
                        task = %options.task,
                        "Request rejected by token gate"
                    );
                    let envelope = ResponseEnvelope::degraded(message, elapsed_ms(start));
                    self.record_request(SensitivityLevel::Unclassified, Outcome::Gated, start);
                    return Ok(envelope);
                }
                Ok(decision) => {
                    if let Some(notice) = decision.message {
                        tracing::info!(company_id = %company_id, notice = %notice, "Token allotment notice");
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        company_id = %company_id,
                        error_kind = %e.kind(),
                        error = %e,
                        "Token gate check failed, allowing request"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.best_effort_failure(Operation::TokenGate);
                    }
                }
            }
        }

        match self.execute(&profile, &options, cancel, start).await {
            Ok((envelope, outcome)) => {
                self.record_request(envelope.sensitivity, outcome, start);
                Ok(envelope)
            }
            Err(e) => {
                let kind = e.kind();
                if kind == ErrorKind::Unknown {
                    tracing::error!(
                        caller_id = %profile.caller_id,
                        task = %options.task,
                        error_kind = %kind,
                        error = %e,
                        "Dispatch failed, returning degraded response"
                    );
                } else {
                    tracing::warn!(
                        caller_id = %profile.caller_id,
                        task = %options.task,
                        error_kind = %kind,
                        error = %e,
                        "Dispatch failed, returning degraded response"
                    );
                }
                self.record_request(SensitivityLevel::Unclassified, Outcome::Degraded, start);
                Ok(ResponseEnvelope::unavailable(elapsed_ms(start)))
            }
        }
    }

    async fn execute(
        &self,
        profile: &CallerProfile,
        options: &RequestOptions,
        cancel: &CancellationToken,
        start: Instant,
    ) -> AppResult<(ResponseEnvelope, Outcome)> {
        let classification = self
            .engine
            .classify(&options.prompt, options.context.as_deref());
        let level = classification.level;
        if let Some(metrics) = &self.metrics {
            metrics.record_classification(level);
        }
        if level.is_sensitive() {
            tracing::info!(
                sensitivity = %level,
                reasons = ?classification.reasons,
                "Sensitive content detected"
            );
        }

        let selection = self.selector.select_model(&options.task, level).await;

        let cache_key = CacheKey {
            company_id: profile.company_id.clone(),
            prompt: options.prompt.clone(),
            model_id: selection.primary.model_id.clone(),
            sensitivity: level,
            task: options.task.clone(),
            system_prompt: options.system_prompt.clone(),
        };

        if self.cache_enabled {
            match self.collaborators.cache.get(&cache_key).await {
                Ok(Some(hit)) => {
                    tracing::debug!(task = %options.task, sensitivity = %level, "Cache hit");
                    let envelope = ResponseEnvelope {
                        content: hit.content,
                        model_used: hit.model_used,
                        backend_used: CACHE_BACKEND.to_string(),
                        confidence: hit.confidence,
                        tokens_in: 0,
                        tokens_out: 0,
                        latency_ms: elapsed_ms(start),
                        sensitivity: level,
                        cached: true,
                    };
                    return Ok((envelope, Outcome::Cached));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Cache read failed, treating as miss");
                    if let Some(metrics) = &self.metrics {
                        metrics.best_effort_failure(Operation::CacheRead);
                    }
                }
            }
        }

        let request = QueryRequest {
            model: selection.primary.model_id.clone(),
            prompt: options.prompt.clone(),
            system_prompt: options.system_prompt.clone(),
            context: options.context.clone(),
            max_tokens: options.max_tokens.unwrap_or(selection.primary.max_tokens),
            temperature: options.temperature.unwrap_or(selection.primary.temperature),
        };

        let routed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            outcome = tokio::time::timeout(self.deadline, self.router.execute(&request, level)) => {
                match outcome {
                    Ok(routed) => routed?,
                    Err(_) => {
                        return Err(AppError::DeadlineExceeded {
                            timeout_seconds: self.deadline.as_secs(),
                        });
                    }
                }
            }
        };

        self.record_attempts(&routed.attempts).await;
        let response = routed.result?;

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let latency_ms = elapsed_ms(start);
        let confidence = infer_confidence(&response.content);
        let metrics = self.metrics.as_deref();

        if self.cache_enabled {
            let entry = CachedEntry {
                content: response.content.clone(),
                model_used: response.model_id.clone(),
                confidence,
                cached_at: Utc::now(),
            };
            best_effort(
                Operation::CacheWrite,
                metrics,
                self.collaborators.cache.put(&cache_key, entry),
            )
            .await;
        }

        let total_tokens = response.tokens.total();
        let record = UsageRecord {
            task: options.task.clone(),
            caller_id: profile.caller_id.clone(),
            company_id: profile.company_id.clone(),
            correlation_id: options.correlation_id.clone(),
            tokens_in: response.tokens.input,
            tokens_out: response.tokens.output,
            estimated_cost_usd: selection.primary.estimate_cost(total_tokens),
            created_at: Utc::now(),
            metadata: UsageMetadata {
                model: response.model_id.clone(),
                backend: response.backend,
                sensitivity: level,
                latency_ms,
                cache_hit: false,
            },
        };
        best_effort(
            Operation::UsageLog,
            metrics,
            self.collaborators.usage.record(record),
        )
        .await;

        if let Some(company_id) = profile.company_id.as_deref() {
            best_effort(
                Operation::BudgetDebit,
                metrics,
                self.collaborators.gate.debit(company_id, u64::from(total_tokens)),
            )
            .await;
        }

        tracing::debug!(
            backend = %response.backend,
            model = %response.model_id,
            sensitivity = %level,
            tokens = total_tokens,
            latency_ms,
            "Dispatch served"
        );

        Ok((
            ResponseEnvelope {
                content: response.content,
                model_used: response.model_id,
                backend_used: response.backend.to_string(),
                confidence,
                tokens_in: response.tokens.input,
                tokens_out: response.tokens.output,
                latency_ms,
                sensitivity: level,
                cached: false,
            },
            Outcome::Served,
        ))
    }

    async fn record_attempts(&self, attempts: &[BackendAttempt]) {
        let Some(health) = &self.health else {
            return;
        };
        for attempt in attempts {
            health
                .record_outcome(attempt.backend, attempt.succeeded(), attempt.latency_ms)
                .await;
        }
    }

    fn record_request(&self, sensitivity: SensitivityLevel, outcome: Outcome, start: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_request(
                sensitivity,
                outcome,
                start.elapsed().as_secs_f64() * 1000.0,
            );
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
