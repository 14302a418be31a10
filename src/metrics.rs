//! Prometheus metrics collection
//!
//! This module provides metrics instrumentation for tracking:
//! - Dispatch requests by sensitivity level and outcome
//! - Dispatch latency
//! - Backend queries, failovers and circuit transitions
//! - Failures of best-effort side effects (cache writes, usage logging, debits)
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use crate::backends::BackendId;
use crate::classification::SensitivityLevel;
use crate::health::Health;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// How a dispatch request ended
///
/// Closed set of label values so the series count stays bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A backend produced the response
    Served,
    /// Answered from the response cache
    Cached,
    /// Rejected by the token gate before classification
    Gated,
    /// Converted to the degraded envelope after a failure
    Degraded,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Served => "served",
            Outcome::Cached => "cached",
            Outcome::Gated => "gated",
            Outcome::Degraded => "degraded",
        }
    }
}

/// Best-effort side effect whose failure is swallowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CacheRead,
    CacheWrite,
    UsageLog,
    BudgetDebit,
    TokenGate,
    CircuitUpdate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CacheRead => "cache_read",
            Operation::CacheWrite => "cache_write",
            Operation::UsageLog => "usage_log",
            Operation::BudgetDebit => "budget_debit",
            Operation::TokenGate => "token_gate",
            Operation::CircuitUpdate => "circuit_update",
        }
    }
}

/// Metrics collector for the dispatch layer
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
    backend_queries: IntCounterVec,
    failovers: IntCounterVec,
    circuit_transitions: IntCounterVec,
    best_effort_failures: IntCounterVec,
    classifications: IntCounterVec,
    budget_downgrades: IntCounter,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 4 levels × 4 outcomes = 16 series
        let requests_total = IntCounterVec::new(
            Opts::new(
                "clearance_router_requests_total",
                "Total dispatch requests by sensitivity level and outcome",
            ),
            &["sensitivity", "outcome"],
        )?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "clearance_router_request_duration_ms",
                "End-to-end dispatch latency in milliseconds",
            )
            .buckets(vec![
                1.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 15000.0, 30000.0, 60000.0,
            ]),
            &["outcome"],
        )?;

        // result: ok or an ErrorKind label
        let backend_queries = IntCounterVec::new(
            Opts::new(
                "clearance_router_backend_queries_total",
                "Backend query attempts by backend and result",
            ),
            &["backend", "result"],
        )?;

        let failovers = IntCounterVec::new(
            Opts::new(
                "clearance_router_failovers_total",
                "Primary-to-fallback failovers by backend pair",
            ),
            &["from", "to"],
        )?;

        let circuit_transitions = IntCounterVec::new(
            Opts::new(
                "clearance_router_circuit_transitions_total",
                "Circuit health transitions by backend and new health state",
            ),
            &["backend", "health"],
        )?;

        // Alert on sustained increases: usage records or debits are being lost
        let best_effort_failures = IntCounterVec::new(
            Opts::new(
                "clearance_router_best_effort_failures_total",
                "Swallowed failures of non-blocking side effects by operation",
            ),
            &["operation"],
        )?;

        let classifications = IntCounterVec::new(
            Opts::new(
                "clearance_router_classifications_total",
                "Classified prompts by resulting sensitivity level",
            ),
            &["level"],
        )?;

        let budget_downgrades = IntCounter::with_opts(Opts::new(
            "clearance_router_budget_downgrades_total",
            "Model selections downgraded because monthly spend crossed the threshold",
        ))?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(backend_queries.clone()))?;
        registry.register(Box::new(failovers.clone()))?;
        registry.register(Box::new(circuit_transitions.clone()))?;
        registry.register(Box::new(best_effort_failures.clone()))?;
        registry.register(Box::new(classifications.clone()))?;
        registry.register(Box::new(budget_downgrades.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            request_duration,
            backend_queries,
            failovers,
            circuit_transitions,
            best_effort_failures,
            classifications,
            budget_downgrades,
        })
    }

    /// Record a finished dispatch request
    ///
    /// Non-finite or negative durations are dropped with a warning; they would
    /// corrupt histogram percentiles.
    pub fn record_request(&self, sensitivity: SensitivityLevel, outcome: Outcome, duration_ms: f64) {
        self.requests_total
            .with_label_values(&[sensitivity.as_str(), outcome.as_str()])
            .inc();

        if !duration_ms.is_finite() || duration_ms < 0.0 {
            tracing::warn!(duration_ms, "Dropping invalid request duration sample");
            return;
        }
        self.request_duration
            .with_label_values(&[outcome.as_str()])
            .observe(duration_ms);
    }

    /// Record one backend query attempt; `result` is "ok" or an error kind label
    pub fn record_backend_query(&self, backend: BackendId, result: &str) {
        self.backend_queries
            .with_label_values(&[backend.as_str(), result])
            .inc();
    }

    pub fn record_failover(&self, from: BackendId, to: BackendId) {
        self.failovers
            .with_label_values(&[from.as_str(), to.as_str()])
            .inc();
    }

    pub fn record_circuit_transition(&self, backend: BackendId, health: Health) {
        self.circuit_transitions
            .with_label_values(&[backend.as_str(), health.as_str()])
            .inc();
    }

    pub fn best_effort_failure(&self, operation: Operation) {
        self.best_effort_failures
            .with_label_values(&[operation.as_str()])
            .inc();
    }

    pub fn record_classification(&self, level: SensitivityLevel) {
        self.classifications
            .with_label_values(&[level.as_str()])
            .inc();
    }

    pub fn budget_downgrade(&self) {
        self.budget_downgrades.inc();
    }

    /// Total swallowed side-effect failures across all operations
    pub fn best_effort_failures_count(&self) -> u64 {
        [
            Operation::CacheRead,
            Operation::CacheWrite,
            Operation::UsageLog,
            Operation::BudgetDebit,
            Operation::TokenGate,
            Operation::CircuitUpdate,
        ]
        .iter()
        .map(|op| {
            self.best_effort_failures
                .with_label_values(&[op.as_str()])
                .get()
        })
        .sum()
    }

    /// Gather all metrics in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the output is not UTF-8.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("Metrics output is not valid UTF-8: {}", e))
        })
    }
}
