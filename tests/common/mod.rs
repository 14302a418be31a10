//! Shared test doubles: scripted backends and in-memory collaborators
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clearance_router::backends::{
    Backend, BackendId, BackendRegistry, ProbeOutcome, QueryRequest, QueryResponse, TokenUsage,
};
use clearance_router::classification::ClassificationEngine;
use clearance_router::error::{AppError, AppResult, BackendError};
use clearance_router::health::HealthMonitor;
use clearance_router::metrics::Metrics;
use clearance_router::models::{BudgetGuard, ModelCatalog, ModelSelector, SpendSource, TaskCategory};
use clearance_router::orchestrator::local::cache_digest;
use clearance_router::orchestrator::{
    AccessPolicy, CacheKey, CachedEntry, CallerProfile, CallerResolver, Collaborators,
    GateDecision, Orchestrator, ResponseCache, TokenGate, UsageLogger, UsageRecord,
};
use clearance_router::routing::{PreferencePair, ProviderRouter, RoutingPreferences};
use clearance_router::store::MemoryStore;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const TOKEN: &str = "tok-alice";
pub const CALLER_ID: &str = "alice";
pub const COMPANY_ID: &str = "acme";

/// Backend whose query results are scripted per call
pub struct MockBackend {
    id: BackendId,
    authorized: bool,
    configured: bool,
    scripted: Mutex<VecDeque<Result<QueryResponse, BackendError>>>,
    fail_all: AtomicBool,
    delay: Option<Duration>,
    probe_ok: AtomicBool,
    queries: AtomicUsize,
    probes: AtomicUsize,
    last_request: Mutex<Option<QueryRequest>>,
}

impl MockBackend {
    /// Configured backend; only Ask Sage is compliance-authorized by default
    pub fn new(id: BackendId) -> Self {
        Self {
            id,
            authorized: id == BackendId::AskSage,
            configured: true,
            scripted: Mutex::new(VecDeque::new()),
            fail_all: AtomicBool::new(false),
            delay: None,
            probe_ok: AtomicBool::new(true),
            queries: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn authorized(mut self, authorized: bool) -> Self {
        self.authorized = authorized;
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every query fails with `BackendUnavailable`
    pub fn failing(self) -> Self {
        self.fail_all.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    pub fn set_probe_ok(&self, ok: bool) {
        self.probe_ok.store(ok, Ordering::SeqCst);
    }

    /// Queue a result for the next unscripted call
    pub fn push(&self, result: Result<QueryResponse, BackendError>) {
        self.scripted.lock().unwrap().push_back(result);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<QueryRequest> {
        self.last_request.lock().unwrap().clone()
    }

    pub fn response(&self, content: &str) -> QueryResponse {
        QueryResponse {
            content: content.to_string(),
            model_id: format!("{}-model", self.id),
            tokens: TokenUsage {
                input: 100,
                output: 200,
            },
            backend: self.id,
        }
    }

    pub fn unavailable(id: BackendId) -> BackendError {
        BackendError::Unavailable {
            backend: id.to_string(),
            reason: "scripted failure".to_string(),
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn is_compliance_authorized(&self) -> bool {
        self.authorized
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, BackendError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(result) = self.scripted.lock().unwrap().pop_front() {
            return result;
        }
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(Self::unavailable(self.id));
        }
        Ok(self.response(&format!(
            "Response from {} with enough detail to count as a medium confidence answer.",
            self.id
        )))
    }

    async fn probe(&self) -> ProbeOutcome {
        self.probes.fetch_add(1, Ordering::SeqCst);
        ProbeOutcome {
            ok: self.probe_ok.load(Ordering::SeqCst),
            latency_ms: 3,
        }
    }
}

pub fn registry(backends: &[Arc<MockBackend>]) -> Arc<BackendRegistry> {
    Arc::new(BackendRegistry::from_backends(
        backends.iter().map(|b| b.clone() as Arc<dyn Backend>),
    ))
}

pub fn default_preferences(store: Arc<MemoryStore>) -> Arc<RoutingPreferences> {
    Arc::new(RoutingPreferences::new(
        store,
        PreferencePair {
            primary: BackendId::AskSage,
            fallback: BackendId::Anthropic,
        },
        Duration::from_secs(60),
    ))
}

/// Spend source returning a fixed total, or failing
pub struct MockSpend {
    spent: Mutex<Option<f64>>,
    calls: AtomicUsize,
}

impl MockSpend {
    pub fn new(spent: f64) -> Self {
        Self {
            spent: Mutex::new(Some(spent)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            spent: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpendSource for MockSpend {
    async fn spend_since(&self, _since: DateTime<Utc>) -> AppResult<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let spent = *self.spent.lock().unwrap();
        spent.ok_or_else(|| AppError::Store("usage table unreachable".to_string()))
    }
}

pub struct MockCallers {
    profiles: HashMap<String, CallerProfile>,
    fail_profile: bool,
}

impl MockCallers {
    pub fn new(role: &str, company_id: Option<&str>) -> Self {
        Self {
            profiles: HashMap::from([(
                TOKEN.to_string(),
                CallerProfile {
                    caller_id: CALLER_ID.to_string(),
                    company_id: company_id.map(str::to_string),
                    role: role.to_string(),
                },
            )]),
            fail_profile: false,
        }
    }

    pub fn failing_profile(mut self) -> Self {
        self.fail_profile = true;
        self
    }
}

#[async_trait]
impl CallerResolver for MockCallers {
    async fn authenticate(&self, token: Option<&str>) -> AppResult<String> {
        token
            .and_then(|t| self.profiles.get(t))
            .map(|p| p.caller_id.clone())
            .ok_or_else(|| AppError::Unauthenticated("unknown token".to_string()))
    }

    async fn profile(&self, caller_id: &str) -> AppResult<CallerProfile> {
        if self.fail_profile {
            return Err(AppError::Store("profile store unreachable".to_string()));
        }
        self.profiles
            .values()
            .find(|p| p.caller_id == caller_id)
            .cloned()
            .ok_or_else(|| AppError::Unauthenticated("no profile".to_string()))
    }
}

pub struct MockAccess {
    pub ungated: HashSet<TaskCategory>,
    pub roles: HashMap<String, HashSet<TaskCategory>>,
}

impl MockAccess {
    /// `chat` ungated; `pricer` may run pricing and strategy
    pub fn standard() -> Self {
        Self {
            ungated: HashSet::from([TaskCategory::Chat, TaskCategory::Summarize]),
            roles: HashMap::from([(
                "pricer".to_string(),
                HashSet::from([TaskCategory::Pricing, TaskCategory::Strategy]),
            )]),
        }
    }
}

#[async_trait]
impl AccessPolicy for MockAccess {
    fn is_ungated(&self, task: &TaskCategory) -> bool {
        self.ungated.contains(task)
    }

    async fn allowed_tasks(&self, role: &str) -> AppResult<HashSet<TaskCategory>> {
        Ok(self.roles.get(role).cloned().unwrap_or_default())
    }
}

pub struct MockGate {
    decision: Mutex<GateDecision>,
    fail_check: AtomicBool,
    fail_debit: AtomicBool,
    pub checks: AtomicUsize,
    debits: Mutex<Vec<(String, u64)>>,
}

impl MockGate {
    pub fn allowing() -> Self {
        Self::with_decision(GateDecision::allow())
    }

    pub fn with_decision(decision: GateDecision) -> Self {
        Self {
            decision: Mutex::new(decision),
            fail_check: AtomicBool::new(false),
            fail_debit: AtomicBool::new(false),
            checks: AtomicUsize::new(0),
            debits: Mutex::new(Vec::new()),
        }
    }

    pub fn set_fail_check(&self, fail: bool) {
        self.fail_check.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_debit(&self, fail: bool) {
        self.fail_debit.store(fail, Ordering::SeqCst);
    }

    pub fn debits(&self) -> Vec<(String, u64)> {
        self.debits.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenGate for MockGate {
    async fn check(&self, _company_id: &str, _correlation_id: Option<&str>) -> AppResult<GateDecision> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.fail_check.load(Ordering::SeqCst) {
            return Err(AppError::Store("billing unreachable".to_string()));
        }
        Ok(self.decision.lock().unwrap().clone())
    }

    async fn debit(&self, company_id: &str, tokens: u64) -> AppResult<()> {
        if self.fail_debit.load(Ordering::SeqCst) {
            return Err(AppError::Store("billing unreachable".to_string()));
        }
        self.debits
            .lock()
            .unwrap()
            .push((company_id.to_string(), tokens));
        Ok(())
    }
}

#[derive(Default)]
pub struct MockCache {
    entries: Mutex<HashMap<String, CachedEntry>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
}

impl MockCache {
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Seed an entry that matches any key with this prompt
    pub fn seed_any_model(&self, prompt: &str, entry: CachedEntry) {
        self.entries
            .lock()
            .unwrap()
            .insert(format!("prompt:{}", prompt.trim().to_lowercase()), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl ResponseCache for MockCache {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<CachedEntry>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Store("cache unreachable".to_string()));
        }
        let entries = self.entries.lock().unwrap();
        let by_prompt = format!("prompt:{}", key.prompt.trim().to_lowercase());
        Ok(entries
            .get(&cache_digest(key))
            .or_else(|| entries.get(&by_prompt))
            .cloned())
    }

    async fn put(&self, key: &CacheKey, entry: CachedEntry) -> AppResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Store("cache unreachable".to_string()));
        }
        self.entries.lock().unwrap().insert(cache_digest(key), entry);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockUsage {
    records: Mutex<Vec<UsageRecord>>,
    fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl MockUsage {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageLogger for MockUsage {
    async fn record(&self, record: UsageRecord) -> AppResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Store("usage table unreachable".to_string()));
        }
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// A fully wired orchestrator over mock backends and collaborators
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub registry: Arc<BackendRegistry>,
    pub health: Arc<HealthMonitor>,
    pub router: Arc<ProviderRouter>,
    pub spend: Arc<MockSpend>,
    pub gate: Arc<MockGate>,
    pub cache: Arc<MockCache>,
    pub usage: Arc<MockUsage>,
    pub metrics: Arc<Metrics>,
    pub orchestrator: Orchestrator,
}

pub struct HarnessOptions {
    pub callers: MockCallers,
    pub gate: MockGate,
    pub spend: MockSpend,
    pub deadline: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            callers: MockCallers::new("pricer", Some(COMPANY_ID)),
            gate: MockGate::allowing(),
            spend: MockSpend::new(0.0),
            deadline: Duration::from_secs(5),
        }
    }
}

impl Harness {
    pub fn new(backends: &[Arc<MockBackend>]) -> Self {
        Self::with_options(backends, HarnessOptions::default())
    }

    pub fn with_options(backends: &[Arc<MockBackend>], options: HarnessOptions) -> Self {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(backends);
        let metrics = Arc::new(Metrics::new().unwrap());
        let health = Arc::new(
            HealthMonitor::new(store.clone(), registry.clone()).with_metrics(metrics.clone()),
        );
        let router = Arc::new(
            ProviderRouter::new(registry.clone(), default_preferences(store.clone()))
                .with_health(health.clone())
                .with_metrics(metrics.clone()),
        );

        let spend = Arc::new(options.spend);
        let budget = Arc::new(BudgetGuard::new(
            spend.clone(),
            500.0,
            0.75,
            Duration::ZERO,
        ));
        let selector = Arc::new(
            ModelSelector::new(ModelCatalog::standard(), budget, BackendId::AskSage)
                .with_metrics(metrics.clone()),
        );

        let gate = Arc::new(options.gate);
        let cache = Arc::new(MockCache::default());
        let usage = Arc::new(MockUsage::default());
        let collaborators = Collaborators {
            callers: Arc::new(options.callers),
            access: Arc::new(MockAccess::standard()),
            gate: gate.clone(),
            cache: cache.clone(),
            usage: usage.clone(),
        };

        let orchestrator = Orchestrator::new(
            collaborators,
            Arc::new(ClassificationEngine::new()),
            selector,
            router.clone(),
        )
        .with_health(health.clone())
        .with_metrics(metrics.clone())
        .with_deadline(options.deadline);

        Self {
            store,
            registry,
            health,
            router,
            spend,
            gate,
            cache,
            usage,
            metrics,
            orchestrator,
        }
    }
}
