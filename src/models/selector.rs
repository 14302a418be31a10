//! Task and sensitivity aware model selection

use super::budget::BudgetGuard;
use super::catalog::{DEFAULT_TASK, ModelCatalog, ModelConfig, ModelKey, TaskCategory};
use crate::backends::BackendId;
use crate::classification::SensitivityLevel;
use crate::metrics::Metrics;
use serde::Serialize;
use std::sync::Arc;

/// Models chosen for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSelection {
    pub primary: ModelConfig,
    /// `None` when the fallback would be the same backend and model as primary
    pub fallback: Option<ModelConfig>,
    pub sensitivity: SensitivityLevel,
    /// Remaining monthly budget, `None` when the spend query failed
    pub remaining_budget: Option<f64>,
}

/// Maps a task and sensitivity level to primary/fallback model configs
///
/// Selection never fails: unknown tasks use the default task's mapping and an
/// unavailable spend source is treated as an unconstrained budget.
pub struct ModelSelector {
    catalog: ModelCatalog,
    budget: Arc<BudgetGuard>,
    compliance_backend: BackendId,
    metrics: Option<Arc<Metrics>>,
}

impl ModelSelector {
    pub fn new(catalog: ModelCatalog, budget: Arc<BudgetGuard>, compliance_backend: BackendId) -> Self {
        Self {
            catalog,
            budget,
            compliance_backend,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub async fn select_model(
        &self,
        task: &TaskCategory,
        sensitivity: SensitivityLevel,
    ) -> ModelSelection {
        let (mut primary_key, fallback_key) = task.mapping().unwrap_or_else(|| {
            tracing::debug!(task = %task, default = %DEFAULT_TASK, "Unknown task, using default mapping");
            DEFAULT_TASK.mapping().unwrap_or((ModelKey::ClaudeSonnet, ModelKey::ClaudeHaiku))
        });

        let (status, budget_known) = self.budget.check_or_unconstrained().await;

        if status.over_threshold && primary_key != self.catalog.cheapest() {
            tracing::warn!(
                task = %task,
                from = %primary_key,
                to = %fallback_key,
                spent_usd = status.spent,
                budget_pct = %format!("{:.0}", status.spent / self.budget.ceiling() * 100.0),
                "Budget threshold exceeded, downgrading model"
            );
            if let Some(metrics) = &self.metrics {
                metrics.budget_downgrade();
            }
            primary_key = fallback_key;
        }

        let mut primary = self.catalog.get(primary_key).clone();
        let mut fallback = (fallback_key != primary_key).then(|| self.catalog.get(fallback_key).clone());

        if sensitivity.is_sensitive() {
            primary.backend = self.compliance_backend;
            if let Some(fallback) = fallback.as_mut() {
                fallback.backend = self.compliance_backend;
            }
        }

        let fallback = fallback.filter(|f| !f.same_target(&primary));

        ModelSelection {
            primary,
            fallback,
            sensitivity,
            remaining_budget: budget_known.then_some(status.remaining),
        }
    }
}
