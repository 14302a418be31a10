//! Model selection under budget pressure and compliance constraints

mod common;

use clearance_router::backends::BackendId;
use clearance_router::classification::SensitivityLevel;
use clearance_router::metrics::Metrics;
use clearance_router::models::{BudgetGuard, ModelCatalog, ModelKey, ModelSelector, TaskCategory};
use common::MockSpend;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Catalog with models spread over all three backends
fn mixed_catalog() -> ModelCatalog {
    let standard = ModelCatalog::standard();
    let entries: HashMap<ModelKey, _> = ModelKey::ALL
        .into_iter()
        .map(|key| {
            let mut entry = standard.get(key).clone();
            entry.backend = match key {
                ModelKey::Gpt4o => BackendId::OpenAi,
                ModelKey::ClaudeOpus | ModelKey::ClaudeSonnet => BackendId::Anthropic,
                ModelKey::ClaudeHaiku => BackendId::AskSage,
            };
            (key, entry)
        })
        .collect();
    ModelCatalog::from_entries(entries).unwrap()
}

fn selector(spend: Arc<MockSpend>, cache_ttl: Duration) -> ModelSelector {
    let guard = BudgetGuard::new(spend, 500.0, 0.75, cache_ttl);
    ModelSelector::new(mixed_catalog(), Arc::new(guard), BackendId::AskSage)
}

fn all_tasks() -> Vec<TaskCategory> {
    let mut tasks = TaskCategory::KNOWN.to_vec();
    tasks.push(TaskCategory::Other("unlisted".to_string()));
    tasks
}

#[tokio::test]
async fn test_sensitive_levels_always_select_compliance_backend() {
    for spent in [0.0, 450.0] {
        let selector = selector(Arc::new(MockSpend::new(spent)), Duration::ZERO);
        for task in all_tasks() {
            for level in [
                SensitivityLevel::Cui,
                SensitivityLevel::CuiRestricted,
                SensitivityLevel::Opsec,
            ] {
                let selection = selector.select_model(&task, level).await;
                assert_eq!(
                    selection.primary.backend,
                    BackendId::AskSage,
                    "task {} at {} spent {}",
                    task,
                    level,
                    spent
                );
                if let Some(fallback) = &selection.fallback {
                    assert_eq!(fallback.backend, BackendId::AskSage);
                    assert!(!fallback.same_target(&selection.primary));
                }
            }
        }
    }
}

#[tokio::test]
async fn test_spend_failure_still_selects() {
    let spend = Arc::new(MockSpend::failing());
    let selector = selector(spend.clone(), Duration::ZERO);

    let selection = selector
        .select_model(&TaskCategory::Strategy, SensitivityLevel::Unclassified)
        .await;

    assert_eq!(spend.calls(), 1);
    assert_eq!(selection.primary.model_id, "claude-opus-4");
    assert!(selection.remaining_budget.is_none());
}

#[tokio::test]
async fn test_unknown_task_falls_back_to_default_mapping() {
    let selector = selector(Arc::new(MockSpend::new(0.0)), Duration::ZERO);
    let unknown = selector
        .select_model(
            &TaskCategory::Other("bid-no-bid".to_string()),
            SensitivityLevel::Unclassified,
        )
        .await;
    let chat = selector
        .select_model(&TaskCategory::Chat, SensitivityLevel::Unclassified)
        .await;
    assert_eq!(unknown.primary, chat.primary);
    assert_eq!(unknown.fallback, chat.fallback);
}

#[tokio::test]
async fn test_downgrade_is_evaluated_per_call() {
    let spend = Arc::new(MockSpend::new(100.0));
    let metrics = Arc::new(Metrics::new().unwrap());
    let guard = BudgetGuard::new(spend.clone(), 200.0, 0.75, Duration::ZERO);
    let selector = ModelSelector::new(mixed_catalog(), Arc::new(guard), BackendId::AskSage)
        .with_metrics(metrics.clone());

    let under = selector
        .select_model(&TaskCategory::Writer, SensitivityLevel::Unclassified)
        .await;
    assert_eq!(under.primary.model_id, "claude-opus-4");

    let over_spend = Arc::new(MockSpend::new(150.0));
    let guard = BudgetGuard::new(over_spend, 200.0, 0.75, Duration::ZERO);
    let over_selector = ModelSelector::new(mixed_catalog(), Arc::new(guard), BackendId::AskSage)
        .with_metrics(metrics.clone());
    let over = over_selector
        .select_model(&TaskCategory::Writer, SensitivityLevel::Unclassified)
        .await;
    assert_eq!(over.primary.model_id, "claude-sonnet-4-5");
    assert!(over.fallback.is_none());
    assert!(metrics.gather().unwrap().contains("clearance_router_budget_downgrades_total 1"));
}

#[tokio::test]
async fn test_spend_total_is_reused_within_cache_window() {
    let spend = Arc::new(MockSpend::new(10.0));
    let cached = selector(spend.clone(), Duration::from_secs(60));

    for _ in 0..5 {
        cached
            .select_model(&TaskCategory::Chat, SensitivityLevel::Unclassified)
            .await;
    }
    assert_eq!(spend.calls(), 1);

    let uncached_spend = Arc::new(MockSpend::new(10.0));
    let uncached = selector(uncached_spend.clone(), Duration::ZERO);
    for _ in 0..3 {
        uncached
            .select_model(&TaskCategory::Chat, SensitivityLevel::Unclassified)
            .await;
    }
    assert_eq!(uncached_spend.calls(), 3);
}
