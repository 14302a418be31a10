//! Per-backend circuit breaker
//!
//! Tracks consecutive failures per backend and exposes a coarse health state
//! used by the router to deprioritize failing backends.
//! - 1 failure → Degraded
//! - 3 consecutive failures → Down
//! - 1 success from any state → Healthy
//!
//! State lives in a [`Store`] under a 5 minute TTL. Entries older than the TTL
//! read as the default Healthy state, and `is_healthy` re-probes the backend
//! before answering for an expired entry.

use crate::backends::{BackendId, BackendRegistry, ProbeOutcome};
use crate::metrics::Metrics;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Consecutive failures before a backend is considered Down
pub const FAILURE_THRESHOLD: u32 = 3;
/// Lifetime of a recorded circuit state
pub const CIRCUIT_TTL: Duration = Duration::from_secs(5 * 60);
/// Upper bound on a single liveness probe
pub const DEFAULT_PROBE_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    #[default]
    Healthy,
    Degraded,
    Down,
}

impl Health {
    pub fn as_str(&self) -> &'static str {
        match self {
            Health::Healthy => "healthy",
            Health::Degraded => "degraded",
            Health::Down => "down",
        }
    }
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded health of one backend
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CircuitState {
    pub consecutive_failures: u32,
    pub health: Health,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_latency_ms: u64,
}

impl CircuitState {
    /// True when never checked or older than [`CIRCUIT_TTL`]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.last_checked_at {
            None => true,
            Some(at) => now
                .signed_duration_since(at)
                .to_std()
                .map(|age| age >= CIRCUIT_TTL)
                // Checked "in the future" (clock skew between writers): treat as fresh
                .unwrap_or(false),
        }
    }

    /// State after folding in one outcome
    pub fn next(&self, success: bool, latency_ms: u64, now: DateTime<Utc>) -> Self {
        if success {
            return Self {
                consecutive_failures: 0,
                health: Health::Healthy,
                last_checked_at: Some(now),
                last_latency_ms: latency_ms,
            };
        }

        let consecutive_failures = self.consecutive_failures.saturating_add(1);
        Self {
            consecutive_failures,
            health: if consecutive_failures >= FAILURE_THRESHOLD {
                Health::Down
            } else {
                Health::Degraded
            },
            last_checked_at: Some(now),
            last_latency_ms: latency_ms,
        }
    }
}

/// Backend status as shown on the status surfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendHealth {
    pub backend: BackendId,
    pub display_name: String,
    pub configured: bool,
    pub compliance_authorized: bool,
    pub state: CircuitState,
}

impl BackendHealth {
    /// Effective health; unconfigured backends always report Down
    pub fn health(&self) -> Health {
        if self.configured {
            self.state.health
        } else {
            Health::Down
        }
    }
}

fn state_key(id: BackendId) -> String {
    format!("circuit:{}", id)
}

/// Circuit breaker over every registered backend
pub struct HealthMonitor {
    store: Arc<dyn Store>,
    registry: Arc<BackendRegistry>,
    probe_deadline: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn Store>, registry: Arc<BackendRegistry>) -> Self {
        Self {
            store,
            registry,
            probe_deadline: DEFAULT_PROBE_DEADLINE,
            metrics: None,
        }
    }

    pub fn with_probe_deadline(mut self, deadline: Duration) -> Self {
        self.probe_deadline = deadline;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Stored state as-is, or `None` when absent, unreadable or expired
    async fn load(&self, id: BackendId) -> Option<CircuitState> {
        let raw = match self.store.get(&state_key(id)).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::debug!(backend = %id, error = %e, "Circuit state read failed, assuming default");
                return None;
            }
        };

        match serde_json::from_str::<CircuitState>(&raw) {
            Ok(state) if !state.is_expired(Utc::now()) => Some(state),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(backend = %id, error = %e, "Discarding unreadable circuit state");
                None
            }
        }
    }

    /// Current circuit state; expired or missing entries read as the default
    pub async fn get_state(&self, id: BackendId) -> CircuitState {
        self.load(id).await.unwrap_or_default()
    }

    /// Fold one call outcome into the backend's circuit
    ///
    /// Concurrent writers are last-writer-wins; the threshold check is
    /// monotonic so the state converges within the TTL window.
    pub async fn record_outcome(&self, id: BackendId, success: bool, latency_ms: u64) -> CircuitState {
        let previous = self.get_state(id).await;
        let next = previous.next(success, latency_ms, Utc::now());

        match serde_json::to_string(&next) {
            Ok(json) => {
                if let Err(e) = self.store.set(&state_key(id), &json, Some(CIRCUIT_TTL)).await {
                    tracing::warn!(backend = %id, error = %e, "Failed to persist circuit state");
                    if let Some(metrics) = &self.metrics {
                        metrics.best_effort_failure(crate::metrics::Operation::CircuitUpdate);
                    }
                }
            }
            Err(e) => {
                tracing::error!(backend = %id, error = %e, "Failed to serialize circuit state");
            }
        }

        if previous.health != next.health {
            match next.health {
                Health::Down => tracing::warn!(
                    backend = %id,
                    consecutive_failures = next.consecutive_failures,
                    "Backend marked down after {} consecutive failures",
                    FAILURE_THRESHOLD
                ),
                Health::Healthy => {
                    tracing::info!(backend = %id, "Backend recovered to healthy state")
                }
                Health::Degraded => tracing::debug!(
                    backend = %id,
                    consecutive_failures = next.consecutive_failures,
                    "Backend degraded"
                ),
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_circuit_transition(id, next.health);
            }
        }

        next
    }

    /// Whether the router should prefer this backend
    ///
    /// Uses the recorded state unless it has expired, in which case the backend
    /// is probed and the outcome folded in first. Unconfigured and unknown
    /// backends are never healthy, and neither is a Degraded one.
    pub async fn is_healthy(&self, id: BackendId) -> bool {
        if !self.registry.is_configured(id) {
            return false;
        }

        let state = match self.load(id).await {
            Some(state) => state,
            None => self.probe(id).await.state,
        };
        state.health == Health::Healthy
    }

    /// Clear recorded state (manual recovery)
    pub async fn reset(&self, id: BackendId) {
        if let Err(e) = self.store.delete(&state_key(id)).await {
            tracing::warn!(backend = %id, error = %e, "Failed to clear circuit state");
        }
        tracing::info!(backend = %id, "Circuit reset");
    }

    /// Probe a backend now and fold the result into its circuit
    ///
    /// Unconfigured backends report Down without a network call and leave the
    /// recorded state untouched.
    pub async fn probe(&self, id: BackendId) -> BackendHealth {
        let Some(backend) = self.registry.get(id) else {
            return BackendHealth {
                backend: id,
                display_name: id.display_name().to_string(),
                configured: false,
                compliance_authorized: false,
                state: CircuitState {
                    health: Health::Down,
                    ..CircuitState::default()
                },
            };
        };

        let configured = backend.is_configured();
        let state = if configured {
            let outcome = match tokio::time::timeout(self.probe_deadline, backend.probe()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::debug!(backend = %id, deadline_ms = self.probe_deadline.as_millis() as u64, "Probe timed out");
                    ProbeOutcome::failed(self.probe_deadline.as_millis() as u64)
                }
            };
            tracing::debug!(backend = %id, ok = outcome.ok, latency_ms = outcome.latency_ms, "Probe completed");
            self.record_outcome(id, outcome.ok, outcome.latency_ms).await
        } else {
            CircuitState {
                health: Health::Down,
                last_checked_at: Some(Utc::now()),
                ..CircuitState::default()
            }
        };

        BackendHealth {
            backend: id,
            display_name: backend.display_name().to_string(),
            configured,
            compliance_authorized: backend.is_compliance_authorized(),
            state,
        }
    }

    /// Recorded state of every registered backend, without probing
    pub async fn snapshot(&self) -> Vec<BackendHealth> {
        let mut out = Vec::with_capacity(self.registry.len());
        for backend in self.registry.iter() {
            let id = backend.id();
            let configured = backend.is_configured();
            let mut state = self.get_state(id).await;
            if !configured {
                state.health = Health::Down;
            }
            out.push(BackendHealth {
                backend: id,
                display_name: backend.display_name().to_string(),
                configured,
                compliance_authorized: backend.is_compliance_authorized(),
                state,
            });
        }
        out
    }

    /// Probe every configured backend once
    pub async fn run_probes(&self) {
        let ids: Vec<BackendId> = self.registry.configured().map(|b| b.id()).collect();
        futures::future::join_all(ids.into_iter().map(|id| self.probe(id))).await;
    }

    /// Start background probing
    ///
    /// Spawns a tokio task that probes configured backends every `interval`,
    /// plus a supervisor task that logs if the probe task ever ends.
    pub fn start_background_probes(self: Arc<Self>, interval: Duration) {
        let handle = tokio::spawn(async move {
            tracing::info!(
                interval_seconds = interval.as_secs(),
                "Starting background health probes"
            );

            loop {
                tokio::time::sleep(interval).await;
                tracing::debug!("Running scheduled health probes");
                self.run_probes().await;
            }
        });

        tokio::spawn(async move {
            match handle.await {
                Ok(_) => {
                    tracing::error!(
                        "Background health probe task terminated unexpectedly. \
                        Circuit state will only change on live traffic until restart."
                    );
                }
                Err(e) if e.is_cancelled() => {
                    tracing::debug!("Background health probe task cancelled");
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        "Background health probe task panicked. \
                        Circuit state will only change on live traffic until restart."
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_transitions() {
        let now = Utc::now();
        let s = CircuitState::default();
        let s = s.next(false, 10, now);
        assert_eq!(s.health, Health::Degraded);
        let s = s.next(false, 10, now);
        assert_eq!(s.health, Health::Degraded);
        let s = s.next(false, 10, now);
        assert_eq!(s.health, Health::Down);
        assert_eq!(s.consecutive_failures, 3);
        let s = s.next(true, 5, now);
        assert_eq!(s.health, Health::Healthy);
        assert_eq!(s.consecutive_failures, 0);
        assert_eq!(s.last_latency_ms, 5);
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        assert!(CircuitState::default().is_expired(now));

        let fresh = CircuitState::default().next(true, 1, now - TimeDelta::seconds(60));
        assert!(!fresh.is_expired(now));

        let stale = CircuitState::default().next(true, 1, now - TimeDelta::seconds(301));
        assert!(stale.is_expired(now));

        let skewed = CircuitState::default().next(true, 1, now + TimeDelta::seconds(30));
        assert!(!skewed.is_expired(now));
    }

    #[test]
    fn test_health_serde() {
        assert_eq!(serde_json::to_string(&Health::Down).unwrap(), "\"down\"");
    }
}
