use super::preferences::RoutingPreferences;
use crate::backends::{Backend, BackendId, BackendRegistry, QueryRequest, QueryResponse};
use crate::classification::SensitivityLevel;
use crate::error::{AppError, AppResult, BackendError, ErrorKind};
use crate::health::{Health, HealthMonitor};
use crate::metrics::Metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Backend choice for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
    pub chosen: BackendId,
    pub fallback: Option<BackendId>,
    pub sensitivity: SensitivityLevel,
    pub rationale: String,
}

/// One backend call made while executing a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendAttempt {
    pub backend: BackendId,
    pub latency_ms: u64,
    /// `None` on success
    pub error: Option<ErrorKind>,
}

impl BackendAttempt {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of [`ProviderRouter::execute`]
#[derive(Debug)]
pub struct RoutedExecution {
    pub decision: RouteDecision,
    /// Calls in the order they were made (primary first)
    pub attempts: Vec<BackendAttempt>,
    pub result: Result<QueryResponse, BackendError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteRole {
    Primary,
    Fallback,
}

/// Status row for the backend listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub backend: BackendId,
    pub display_name: String,
    pub configured: bool,
    pub compliance_authorized: bool,
    /// Role for unclassified traffic under the current preference
    pub role: Option<RouteRole>,
    pub health: Health,
    pub consecutive_failures: u32,
}

/// Chooses backends under compliance constraints and executes with failover
///
/// Failover switches backend at most once; per-backend retries belong to the
/// clients. The router never records circuit outcomes itself.
pub struct ProviderRouter {
    registry: Arc<BackendRegistry>,
    preferences: Arc<RoutingPreferences>,
    health: Option<Arc<HealthMonitor>>,
    metrics: Option<Arc<Metrics>>,
}

impl ProviderRouter {
    pub fn new(registry: Arc<BackendRegistry>, preferences: Arc<RoutingPreferences>) -> Self {
        Self {
            registry,
            preferences,
            health: None,
            metrics: None,
        }
    }

    /// Swap primary and fallback when the primary is unhealthy and the fallback is not
    pub fn with_health(mut self, health: Arc<HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn preferences(&self) -> &Arc<RoutingPreferences> {
        &self.preferences
    }

    /// Pick primary and fallback backends for `sensitivity`
    ///
    /// # Errors
    /// `ComplianceRoutingBlocked` when sensitive content has no configured
    /// compliance-authorized backend; `NoBackendsConfigured` when nothing is
    /// configured at all.
    pub async fn route(&self, sensitivity: SensitivityLevel) -> AppResult<RouteDecision> {
        let eligible: Vec<BackendId> = if sensitivity.is_sensitive() {
            self.registry.compliance_authorized().map(|b| b.id()).collect()
        } else {
            self.registry.configured().map(|b| b.id()).collect()
        };

        let Some(&first) = eligible.first() else {
            return Err(if sensitivity.is_sensitive() {
                AppError::ComplianceRoutingBlocked {
                    level: sensitivity.to_string(),
                }
            } else {
                AppError::NoBackendsConfigured
            });
        };

        let (mut chosen, mut fallback, mut rationale) = if sensitivity.is_sensitive() {
            (
                first,
                eligible.get(1).copied(),
                format!(
                    "{} content restricted to compliance-authorized backends",
                    sensitivity
                ),
            )
        } else {
            let pref = self.preferences.current().await;
            let chosen = if eligible.contains(&pref.primary) {
                pref.primary
            } else {
                tracing::debug!(preferred = %pref.primary, substitute = %first, "Preferred primary not configured");
                first
            };
            let fallback = if pref.fallback != chosen && eligible.contains(&pref.fallback) {
                Some(pref.fallback)
            } else {
                eligible.iter().copied().find(|id| *id != chosen)
            };
            let rationale = if chosen == pref.primary {
                "configured routing preference".to_string()
            } else {
                format!("preferred primary {} not configured", pref.primary)
            };
            (chosen, fallback, rationale)
        };

        if let (Some(health), Some(candidate)) = (&self.health, fallback)
            && !health.is_healthy(chosen).await
            && health.is_healthy(candidate).await
        {
            tracing::info!(
                unhealthy = %chosen,
                promoted = %candidate,
                "Primary backend unhealthy, promoting fallback"
            );
            rationale = format!("{}; {} unhealthy, promoted {}", rationale, chosen, candidate);
            fallback = Some(chosen);
            chosen = candidate;
        }

        Ok(RouteDecision {
            chosen,
            fallback,
            sensitivity,
            rationale,
        })
    }

    fn backend(&self, id: BackendId) -> AppResult<&Arc<dyn Backend>> {
        self.registry
            .get(id)
            .ok_or_else(|| AppError::Internal(format!("backend '{}' missing from registry", id)))
    }

    async fn attempt(
        &self,
        backend: &Arc<dyn Backend>,
        request: &QueryRequest,
        attempts: &mut Vec<BackendAttempt>,
    ) -> Result<QueryResponse, BackendError> {
        let start = Instant::now();
        let result = backend.query(request).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        let error = result.as_ref().err().map(BackendError::kind);

        if let Some(metrics) = &self.metrics {
            metrics.record_backend_query(backend.id(), error.map_or("ok", |k| k.as_str()));
        }
        attempts.push(BackendAttempt {
            backend: backend.id(),
            latency_ms,
            error,
        });
        result
    }

    /// Route and execute, reporting every backend attempt
    ///
    /// On a primary failure with a fallback present, the fallback's result is
    /// returned as-is. Without a fallback the primary's error is returned
    /// unchanged.
    pub async fn execute(
        &self,
        request: &QueryRequest,
        sensitivity: SensitivityLevel,
    ) -> AppResult<RoutedExecution> {
        let decision = self.route(sensitivity).await?;
        let primary = self.backend(decision.chosen)?;
        let mut attempts = Vec::with_capacity(2);

        let first = self.attempt(primary, request, &mut attempts).await;
        let result = match (first, decision.fallback) {
            (Ok(response), _) => Ok(response),
            (Err(e), None) => Err(e),
            (Err(e), Some(fallback_id)) => {
                tracing::warn!(
                    primary = %decision.chosen,
                    fallback = %fallback_id,
                    error_kind = %e.kind(),
                    error = %e,
                    "Primary backend failed, failing over"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_failover(decision.chosen, fallback_id);
                }
                let fallback = self.backend(fallback_id)?;
                self.attempt(fallback, request, &mut attempts).await
            }
        };

        Ok(RoutedExecution {
            decision,
            attempts,
            result,
        })
    }

    /// Route and execute, returning only the backend response
    pub async fn execute_routed(
        &self,
        request: &QueryRequest,
        sensitivity: SensitivityLevel,
    ) -> AppResult<QueryResponse> {
        self.execute(request, sensitivity)
            .await?
            .result
            .map_err(AppError::Backend)
    }

    /// Every registered backend with its role and circuit health
    pub async fn statuses(&self) -> Vec<BackendStatus> {
        let pref = self.preferences.current().await;
        let mut out = Vec::with_capacity(self.registry.len());

        for backend in self.registry.iter() {
            let id = backend.id();
            let configured = backend.is_configured();
            let (health, consecutive_failures) = match &self.health {
                Some(monitor) => {
                    let state = monitor.get_state(id).await;
                    let health = if configured { state.health } else { Health::Down };
                    (health, state.consecutive_failures)
                }
                None if configured => (Health::Healthy, 0),
                None => (Health::Down, 0),
            };
            let role = if id == pref.primary {
                Some(RouteRole::Primary)
            } else if id == pref.fallback {
                Some(RouteRole::Fallback)
            } else {
                None
            };

            out.push(BackendStatus {
                backend: id,
                display_name: backend.display_name().to_string(),
                configured,
                compliance_authorized: backend.is_compliance_authorized(),
                role,
                health,
                consecutive_failures,
            });
        }
        out
    }
}
