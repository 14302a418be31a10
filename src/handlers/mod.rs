//! HTTP surface for the dispatch service

use crate::backends::{BackendId, BackendRegistry};
use crate::classification::ClassificationEngine;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::health::HealthMonitor;
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::models::{BudgetGuard, ModelCatalog, ModelSelector};
use crate::orchestrator::{
    AllowanceTokenGate, CallerProfile, Collaborators, Orchestrator, RoleAccessPolicy,
    StaticCallerResolver, StoreResponseCache, UsageLedger,
};
use crate::routing::{PreferencePair, ProviderRouter, RoutingPreferences};
use crate::store::{RedisStore, Store, TieredStore};
use axum::http::{HeaderMap, header::AUTHORIZATION};
use axum::routing::{get, post, put};
use axum::{Router, middleware};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

pub mod backends;
pub mod classify;
pub mod dispatch;
pub mod health;
pub mod metrics;

/// Application state shared across all handlers
///
/// Every component is constructed once here and shared by `Arc`.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    orchestrator: Arc<Orchestrator>,
    router: Arc<ProviderRouter>,
    health: Arc<HealthMonitor>,
    access: Arc<RoleAccessPolicy>,
    ledger: Arc<UsageLedger>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Build state with backend credentials read from the process environment
    pub fn new(config: Config) -> AppResult<Self> {
        let registry = BackendRegistry::from_config(&config, |name| std::env::var(name).ok());
        Self::with_registry(config, registry)
    }

    /// Build state around an existing backend registry
    pub fn with_registry(config: Config, registry: BackendRegistry) -> AppResult<Self> {
        let store: Arc<dyn Store> = match config.store.redis_url.as_deref() {
            Some(url) => {
                let durable = RedisStore::new(url, config.store.key_prefix.clone())?;
                tracing::info!("Using Redis-backed store with in-memory fallback");
                Arc::new(TieredStore::new(Arc::new(durable)))
            }
            None => {
                tracing::info!("No Redis URL configured, using in-memory store");
                Arc::new(TieredStore::local_only())
            }
        };
        Self::with_store(config, registry, store)
    }

    /// Build state around an existing registry and store
    pub fn with_store(
        config: Config,
        registry: BackendRegistry,
        store: Arc<dyn Store>,
    ) -> AppResult<Self> {
        let metrics = Arc::new(Metrics::new().map_err(|e| {
            AppError::Internal(format!("failed to initialize metrics: {}", e))
        })?);
        let registry = Arc::new(registry);

        if registry.configured().next().is_none() {
            tracing::warn!("No backends configured; every dispatch will degrade");
        }

        let health = Arc::new(
            HealthMonitor::new(store.clone(), registry.clone()).with_metrics(metrics.clone()),
        );
        let preferences = Arc::new(RoutingPreferences::new(
            store.clone(),
            PreferencePair {
                primary: config.routing.primary,
                fallback: config.routing.fallback,
            },
            Duration::from_secs(config.routing.preference_ttl_seconds),
        ));
        let router = Arc::new(
            ProviderRouter::new(registry.clone(), preferences)
                .with_health(health.clone())
                .with_metrics(metrics.clone()),
        );

        let ledger = Arc::new(UsageLedger::new());
        let budget = Arc::new(BudgetGuard::new(
            ledger.clone(),
            config.budget.monthly_ceiling_usd,
            config.budget.downgrade_threshold,
            Duration::from_secs(config.budget.spend_cache_seconds),
        ));
        let compliance_backend = registry
            .iter()
            .find(|b| b.is_compliance_authorized())
            .map_or(BackendId::AskSage, |b| b.id());
        let selector = Arc::new(
            ModelSelector::new(ModelCatalog::standard(), budget, compliance_backend)
                .with_metrics(metrics.clone()),
        );

        let access = Arc::new(RoleAccessPolicy::new(&config.access));
        let collaborators = Collaborators {
            callers: Arc::new(StaticCallerResolver::new(&config.callers)),
            access: access.clone(),
            gate: Arc::new(AllowanceTokenGate::new(&config.companies)),
            cache: Arc::new(StoreResponseCache::new(store, config.cache.clone())),
            usage: ledger.clone(),
        };
        let orchestrator = Arc::new(
            Orchestrator::new(
                collaborators,
                Arc::new(ClassificationEngine::new()),
                selector,
                router.clone(),
            )
            .with_health(health.clone())
            .with_metrics(metrics.clone())
            .with_deadline(config.request_timeout())
            .with_cache_enabled(config.cache.enabled),
        );

        Ok(Self {
            config: Arc::new(config),
            orchestrator,
            router,
            health,
            access,
            ledger,
            metrics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn router(&self) -> &ProviderRouter {
        &self.router
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Authenticate and require an admin role
    ///
    /// # Errors
    /// `Unauthenticated` for bad tokens, `Forbidden` for non-admin roles.
    pub async fn require_admin(&self, headers: &HeaderMap, action: &str) -> AppResult<CallerProfile> {
        let profile = self.orchestrator.authenticate(bearer_token(headers)).await?;
        if self.access.is_admin(&profile.role) {
            Ok(profile)
        } else {
            Err(AppError::Forbidden {
                role: profile.role,
                task: action.to_string(),
            })
        }
    }
}

/// Bearer token from the `Authorization` header, if any
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The service's routes with request-id and trace layers
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/v1/dispatch", post(dispatch::handler))
        .route("/v1/classify", post(classify::handler))
        .route("/v1/backends", get(backends::list))
        .route("/v1/backends/routing", put(backends::update_routing))
        .route("/v1/backends/{id}/reset", post(backends::reset))
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
