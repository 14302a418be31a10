//! In-process collaborator implementations backed by configuration
//!
//! The binary runs with these; deployments embedding the library can supply
//! their own implementations of the traits in [`super::collaborators`].

use super::collaborators::{
    AccessPolicy, CacheKey, CachedEntry, CallerProfile, CallerResolver, GateDecision,
    ResponseCache, TokenGate, UsageLogger, UsageRecord,
};
use crate::config::{AccessConfig, CacheConfig, CallerEntry, CompanyEntry};
use crate::error::{AppError, AppResult};
use crate::models::{SpendSource, TaskCategory, start_of_month};
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Callers from the static `[[callers]]` table
pub struct StaticCallerResolver {
    by_token: HashMap<String, CallerEntry>,
}

impl StaticCallerResolver {
    pub fn new(callers: &[CallerEntry]) -> Self {
        Self {
            by_token: callers
                .iter()
                .map(|c| (c.token.clone(), c.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl CallerResolver for StaticCallerResolver {
    async fn authenticate(&self, token: Option<&str>) -> AppResult<String> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthenticated("missing bearer token".to_string()))?;

        self.by_token
            .get(token)
            .map(|c| c.id.clone())
            .ok_or_else(|| AppError::Unauthenticated("unknown bearer token".to_string()))
    }

    async fn profile(&self, caller_id: &str) -> AppResult<CallerProfile> {
        self.by_token
            .values()
            .find(|c| c.id == caller_id)
            .map(|c| CallerProfile {
                caller_id: c.id.clone(),
                company_id: c.company_id.clone(),
                role: c.role.clone(),
            })
            .ok_or_else(|| {
                AppError::Unauthenticated(format!("no profile for caller '{}'", caller_id))
            })
    }
}

/// Role table from the `[access]` section
pub struct RoleAccessPolicy {
    ungated: HashSet<TaskCategory>,
    admin_roles: HashSet<String>,
    roles: HashMap<String, HashSet<TaskCategory>>,
}

fn parse_tasks(names: &[String]) -> HashSet<TaskCategory> {
    names
        .iter()
        .map(|n| n.parse::<TaskCategory>())
        .filter_map(Result::ok)
        .collect()
}

impl RoleAccessPolicy {
    pub fn new(access: &AccessConfig) -> Self {
        Self {
            ungated: parse_tasks(&access.ungated_tasks),
            admin_roles: access.admin_roles.iter().cloned().collect(),
            roles: access
                .roles
                .iter()
                .map(|(role, tasks)| (role.clone(), parse_tasks(tasks)))
                .collect(),
        }
    }

    /// Whether `role` may change routing preferences and reset circuits
    pub fn is_admin(&self, role: &str) -> bool {
        self.admin_roles.contains(role)
    }
}

#[async_trait]
impl AccessPolicy for RoleAccessPolicy {
    fn is_ungated(&self, task: &TaskCategory) -> bool {
        self.ungated.contains(task)
    }

    async fn allowed_tasks(&self, role: &str) -> AppResult<HashSet<TaskCategory>> {
        Ok(self.roles.get(role).cloned().unwrap_or_default())
    }
}

pub const NO_SUBSCRIPTION_MESSAGE: &str = "No active subscription. Subscribe to enable AI features.";
pub const HARD_BLOCK_MESSAGE: &str = "Monthly AI token limit exceeded (120%). Purchase additional tokens or wait for the next billing period.";
pub const SOFT_BLOCK_MESSAGE: &str =
    "Monthly AI token limit reached. Upgrade your plan or purchase additional tokens.";
pub const URGENT_MESSAGE: &str = "You're almost out of tokens this month. Purchase more or upgrade your plan to keep using AI features.";
pub const GRACE_MESSAGE: &str =
    "Monthly limit reached. Grace period active for in-progress proposal.";
pub const WARNING_MESSAGE: &str =
    "You're running low on tokens. Consider upgrading your plan or purchasing more.";

/// Graduated position against a monthly allotment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AllowanceLevel {
    Normal,
    /// 75% used
    Warning,
    /// 90% used
    Urgent,
    /// 100% used
    SoftBlock,
    /// 120% used
    HardBlock,
}

impl AllowanceLevel {
    pub fn from_usage(used: u64, allotment: u64) -> Self {
        if allotment == 0 {
            return Self::HardBlock;
        }
        let pct = used as f64 / allotment as f64 * 100.0;
        match pct {
            p if p >= 120.0 => Self::HardBlock,
            p if p >= 100.0 => Self::SoftBlock,
            p if p >= 90.0 => Self::Urgent,
            p if p >= 75.0 => Self::Warning,
            _ => Self::Normal,
        }
    }

    pub fn decision(self) -> GateDecision {
        match self {
            Self::Normal => GateDecision::allow(),
            Self::Warning => GateDecision::warn(WARNING_MESSAGE),
            Self::Urgent => GateDecision::warn(URGENT_MESSAGE),
            Self::SoftBlock => GateDecision::block(SOFT_BLOCK_MESSAGE),
            Self::HardBlock => GateDecision::block(HARD_BLOCK_MESSAGE),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct MonthlyUsage {
    period_start: DateTime<Utc>,
    tokens: u64,
}

/// Tokens a company may run over its allotment on a grace period
pub const GRACE_PERIOD_TOKENS: u64 = 10_000;

/// How recently a correlation id must have been active to earn a grace period
pub const GRACE_PERIOD_HOURS: i64 = 48;

fn grace_window() -> TimeDelta {
    TimeDelta::hours(GRACE_PERIOD_HOURS)
}

/// Per-company monthly token allotments from `[[companies]]`
///
/// Usage counters reset at the start of each calendar month (UTC). A request
/// that reaches the soft block still goes through when it carries a
/// correlation id (an opportunity in progress) that was let through within
/// the last [`GRACE_PERIOD_HOURS`] hours, as long as the company is no more than
/// [`GRACE_PERIOD_TOKENS`] over its allotment.
pub struct AllowanceTokenGate {
    allotments: HashMap<String, u64>,
    usage: RwLock<HashMap<String, MonthlyUsage>>,
    /// (company, correlation id) → last allowed check
    activity: RwLock<HashMap<(String, String), DateTime<Utc>>>,
}

impl AllowanceTokenGate {
    pub fn new(companies: &[CompanyEntry]) -> Self {
        Self {
            allotments: companies
                .iter()
                .map(|c| (c.id.clone(), c.monthly_token_allotment))
                .collect(),
            usage: RwLock::new(HashMap::new()),
            activity: RwLock::new(HashMap::new()),
        }
    }

    async fn note_activity(&self, company_id: &str, correlation_id: &str, at: DateTime<Utc>) {
        let mut activity = self.activity.write().await;
        activity.retain(|_, seen| at - *seen <= grace_window());
        activity.insert((company_id.to_string(), correlation_id.to_string()), at);
    }

    async fn recently_active(&self, company_id: &str, correlation_id: &str, now: DateTime<Utc>) -> bool {
        self.activity
            .read()
            .await
            .get(&(company_id.to_string(), correlation_id.to_string()))
            .is_some_and(|seen| now - *seen <= grace_window())
    }

    /// Tokens debited to `company_id` this month
    pub async fn used(&self, company_id: &str) -> u64 {
        let period_start = start_of_month(Utc::now());
        self.usage
            .read()
            .await
            .get(company_id)
            .filter(|u| u.period_start == period_start)
            .map_or(0, |u| u.tokens)
    }
}

#[async_trait]
impl TokenGate for AllowanceTokenGate {
    async fn check(&self, company_id: &str, correlation_id: Option<&str>) -> AppResult<GateDecision> {
        let Some(&allotment) = self.allotments.get(company_id) else {
            tracing::info!(company_id = %company_id, "Token gate blocked request: no subscription");
            return Ok(GateDecision::block(NO_SUBSCRIPTION_MESSAGE));
        };

        let now = Utc::now();
        let used = self.used(company_id).await;
        let level = AllowanceLevel::from_usage(used, allotment);

        if level == AllowanceLevel::SoftBlock
            && let Some(correlation_id) = correlation_id
            && used.saturating_sub(allotment) <= GRACE_PERIOD_TOKENS
            && self.recently_active(company_id, correlation_id, now).await
        {
            tracing::info!(
                company_id = %company_id,
                correlation_id = %correlation_id,
                used,
                allotment,
                "Token gate allowed request on grace period"
            );
            self.note_activity(company_id, correlation_id, now).await;
            return Ok(GateDecision::warn(GRACE_MESSAGE));
        }

        if level >= AllowanceLevel::SoftBlock {
            tracing::info!(
                company_id = %company_id,
                correlation_id = correlation_id.unwrap_or(""),
                used,
                allotment,
                level = ?level,
                "Token gate blocked request"
            );
        } else if let Some(correlation_id) = correlation_id {
            self.note_activity(company_id, correlation_id, now).await;
        }
        Ok(level.decision())
    }

    async fn debit(&self, company_id: &str, tokens: u64) -> AppResult<()> {
        let period_start = start_of_month(Utc::now());
        let mut usage = self.usage.write().await;
        let entry = usage
            .entry(company_id.to_string())
            .or_insert(MonthlyUsage {
                period_start,
                tokens: 0,
            });
        if entry.period_start != period_start {
            *entry = MonthlyUsage {
                period_start,
                tokens: 0,
            };
        }
        entry.tokens = entry.tokens.saturating_add(tokens);
        tracing::debug!(company_id = %company_id, tokens, total = entry.tokens, "Debited tokens");
        Ok(())
    }
}

/// Hex SHA-256 over the normalized key fields
///
/// Prompt and system prompt are trimmed and lowercased; the company id leads
/// so tenants never share entries.
pub fn cache_digest(key: &CacheKey) -> String {
    let prompt = key.prompt.trim().to_lowercase();
    let system_prompt = key
        .system_prompt
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default();
    let normalized = [
        key.company_id.as_deref().unwrap_or(""),
        prompt.as_str(),
        key.model_id.as_str(),
        key.sensitivity.as_str(),
        key.task.as_str(),
        system_prompt.as_str(),
    ]
    .join("|");

    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Store key for a cached response: `cache:{company}:{task}:{digest}`
pub fn cache_store_key(key: &CacheKey) -> String {
    format!(
        "cache:{}:{}:{}",
        key.company_id.as_deref().unwrap_or("-"),
        key.task,
        cache_digest(key)
    )
}

/// Response cache persisted through a [`Store`] with per-task TTLs
pub struct StoreResponseCache {
    store: Arc<dyn Store>,
    config: CacheConfig,
}

impl StoreResponseCache {
    pub fn new(store: Arc<dyn Store>, config: CacheConfig) -> Self {
        Self { store, config }
    }
}

#[async_trait]
impl ResponseCache for StoreResponseCache {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<CachedEntry>> {
        let Some(raw) = self.store.get(&cache_store_key(key)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                tracing::warn!(task = %key.task, error = %e, "Discarding unreadable cache entry");
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &CacheKey, entry: CachedEntry) -> AppResult<()> {
        let json = serde_json::to_string(&entry)
            .map_err(|e| AppError::Internal(format!("failed to serialize cache entry: {}", e)))?;
        self.store
            .set(&cache_store_key(key), &json, Some(self.config.ttl_for(&key.task)))
            .await?;
        Ok(())
    }
}

/// Recent records kept by [`UsageLedger::new`]
pub const DEFAULT_RECENT_RECORDS: usize = 10_000;

#[derive(Debug)]
struct LedgerPeriod {
    period_start: DateTime<Utc>,
    spent_usd: f64,
    recent: VecDeque<UsageRecord>,
}

/// In-memory usage records for the current calendar month
///
/// Doubles as the budget guard's spend source. A running cost total covers the
/// whole month, while only the most recent records are retained. Records from
/// an earlier month are dropped once a newer one arrives. Every record is also
/// emitted as a structured log line so an external collector can persist it.
pub struct UsageLedger {
    capacity: usize,
    state: RwLock<LedgerPeriod>,
}

impl Default for UsageLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RECENT_RECORDS)
    }
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: RwLock::new(LedgerPeriod {
                // The first record sets the tracked month
                period_start: DateTime::<Utc>::MIN_UTC,
                spent_usd: 0.0,
                recent: VecDeque::new(),
            }),
        }
    }

    /// Retained records, oldest first
    pub async fn records(&self) -> Vec<UsageRecord> {
        self.state.read().await.recent.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.recent.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.recent.is_empty()
    }
}

#[async_trait]
impl UsageLogger for UsageLedger {
    async fn record(&self, record: UsageRecord) -> AppResult<()> {
        tracing::info!(
            target: "clearance_router::usage",
            task = %record.task,
            caller_id = %record.caller_id,
            company_id = record.company_id.as_deref().unwrap_or(""),
            correlation_id = record.correlation_id.as_deref().unwrap_or(""),
            tokens_in = record.tokens_in,
            tokens_out = record.tokens_out,
            cost_usd = record.estimated_cost_usd,
            model = %record.metadata.model,
            backend = %record.metadata.backend,
            sensitivity = %record.metadata.sensitivity,
            latency_ms = record.metadata.latency_ms,
            "Usage recorded"
        );

        let record_period = start_of_month(record.created_at);
        let mut state = self.state.write().await;
        if record_period > state.period_start {
            tracing::debug!(
                previous = %state.period_start,
                current = %record_period,
                evicted = state.recent.len(),
                "Usage ledger rolled over to a new month"
            );
            state.period_start = record_period;
            state.spent_usd = 0.0;
            state.recent.clear();
        } else if record_period < state.period_start {
            tracing::debug!(created_at = %record.created_at, "Ignoring usage record from a closed month");
            return Ok(());
        }

        state.spent_usd += record.estimated_cost_usd;
        state.recent.push_back(record);
        while state.recent.len() > self.capacity {
            state.recent.pop_front();
        }
        Ok(())
    }
}

#[async_trait]
impl SpendSource for UsageLedger {
    /// Month-to-date total when `since` is at or before the tracked month's
    /// start; otherwise a sum over the retained records.
    async fn spend_since(&self, since: DateTime<Utc>) -> AppResult<f64> {
        let state = self.state.read().await;
        if since <= state.period_start {
            return Ok(state.spent_usd);
        }
        Ok(state
            .recent
            .iter()
            .filter(|r| r.created_at >= since)
            .map(|r| r.estimated_cost_usd)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::BackendId;
    use crate::classification::SensitivityLevel;
    use crate::orchestrator::collaborators::UsageMetadata;
    use crate::orchestrator::envelope::Confidence;
    use crate::store::MemoryStore;

    fn caller(token: &str, id: &str, role: &str) -> CallerEntry {
        CallerEntry {
            token: token.to_string(),
            id: id.to_string(),
            company_id: Some("acme".to_string()),
            role: role.to_string(),
        }
    }

    fn key(prompt: &str) -> CacheKey {
        CacheKey {
            company_id: Some("acme".to_string()),
            prompt: prompt.to_string(),
            model_id: "claude-sonnet-4-5".to_string(),
            sensitivity: SensitivityLevel::Unclassified,
            task: TaskCategory::Strategy,
            system_prompt: None,
        }
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticCallerResolver::new(&[caller("tok-1", "alice", "capture_manager")]);

        assert_eq!(resolver.authenticate(Some("tok-1")).await.unwrap(), "alice");
        assert!(matches!(
            resolver.authenticate(None).await,
            Err(AppError::Unauthenticated(_))
        ));
        assert!(matches!(
            resolver.authenticate(Some("nope")).await,
            Err(AppError::Unauthenticated(_))
        ));

        let profile = resolver.profile("alice").await.unwrap();
        assert_eq!(profile.role, "capture_manager");
        assert_eq!(profile.company_id.as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn test_role_access_policy() {
        let mut access = AccessConfig::default();
        access.roles.insert(
            "pricer".to_string(),
            vec!["pricing".to_string(), "Strategy".to_string()],
        );
        let policy = RoleAccessPolicy::new(&access);

        assert!(policy.is_ungated(&TaskCategory::Chat));
        assert!(!policy.is_ungated(&TaskCategory::Pricing));

        let allowed = policy.allowed_tasks("pricer").await.unwrap();
        assert!(allowed.contains(&TaskCategory::Pricing));
        assert!(allowed.contains(&TaskCategory::Strategy));
        assert!(policy.allowed_tasks("viewer").await.unwrap().is_empty());

        assert!(policy.is_admin("admin"));
        assert!(!policy.is_admin("pricer"));
    }

    #[test]
    fn test_allowance_levels() {
        assert_eq!(AllowanceLevel::from_usage(0, 1000), AllowanceLevel::Normal);
        assert_eq!(AllowanceLevel::from_usage(750, 1000), AllowanceLevel::Warning);
        assert_eq!(AllowanceLevel::from_usage(900, 1000), AllowanceLevel::Urgent);
        assert_eq!(AllowanceLevel::from_usage(1000, 1000), AllowanceLevel::SoftBlock);
        assert_eq!(AllowanceLevel::from_usage(1200, 1000), AllowanceLevel::HardBlock);
    }

    #[tokio::test]
    async fn test_token_gate_graduated() {
        let gate = AllowanceTokenGate::new(&[CompanyEntry {
            id: "acme".to_string(),
            monthly_token_allotment: 1000,
        }]);

        assert_eq!(gate.check("acme", None).await.unwrap(), GateDecision::allow());

        gate.debit("acme", 800).await.unwrap();
        let decision = gate.check("acme", None).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.message.as_deref(), Some(WARNING_MESSAGE));

        gate.debit("acme", 250).await.unwrap();
        let decision = gate.check("acme", Some("opp-7")).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.message.as_deref(), Some(SOFT_BLOCK_MESSAGE));
        assert_eq!(gate.used("acme").await, 1050);
    }

    #[tokio::test]
    async fn test_token_gate_grace_period_for_active_correlation() {
        let gate = AllowanceTokenGate::new(&[CompanyEntry {
            id: "acme".to_string(),
            monthly_token_allotment: 1000,
        }]);

        // Seen while under the limit
        assert!(gate.check("acme", Some("opp-7")).await.unwrap().allowed);

        gate.debit("acme", 1050).await.unwrap();
        let decision = gate.check("acme", Some("opp-7")).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.message.as_deref(), Some(GRACE_MESSAGE));

        // Unknown or missing correlation ids stay blocked
        let decision = gate.check("acme", Some("opp-9")).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.message.as_deref(), Some(SOFT_BLOCK_MESSAGE));
        assert!(!gate.check("acme", None).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_token_gate_grace_period_limits() {
        let big = AllowanceTokenGate::new(&[CompanyEntry {
            id: "acme".to_string(),
            monthly_token_allotment: 100_000,
        }]);
        assert!(big.check("acme", Some("opp-7")).await.unwrap().allowed);

        // More than the grace allowance over the allotment
        big.debit("acme", 100_000 + GRACE_PERIOD_TOKENS + 1).await.unwrap();
        let decision = big.check("acme", Some("opp-7")).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.message.as_deref(), Some(SOFT_BLOCK_MESSAGE));

        // Activity older than the window does not count
        let gate = AllowanceTokenGate::new(&[CompanyEntry {
            id: "acme".to_string(),
            monthly_token_allotment: 1000,
        }]);
        let stale = Utc::now() - TimeDelta::hours(GRACE_PERIOD_HOURS) - TimeDelta::minutes(1);
        gate.note_activity("acme", "opp-7", stale).await;
        gate.debit("acme", 1000).await.unwrap();
        assert!(!gate.check("acme", Some("opp-7")).await.unwrap().allowed);

        // The hard block has no grace period
        gate.note_activity("acme", "opp-8", Utc::now()).await;
        gate.debit("acme", 200).await.unwrap();
        let decision = gate.check("acme", Some("opp-8")).await.unwrap();
        assert_eq!(decision.message.as_deref(), Some(HARD_BLOCK_MESSAGE));
    }

    #[tokio::test]
    async fn test_token_gate_unknown_company_blocked() {
        let gate = AllowanceTokenGate::new(&[]);
        let decision = gate.check("ghost", None).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.message.as_deref(), Some(NO_SUBSCRIPTION_MESSAGE));
    }

    #[test]
    fn test_cache_key_normalization() {
        let a = key("  What is our Win Theme? ");
        let b = key("what is our win theme?");
        assert_eq!(cache_digest(&a), cache_digest(&b));
        assert_eq!(cache_digest(&a).len(), 64);

        let mut other_tenant = b.clone();
        other_tenant.company_id = Some("globex".to_string());
        assert_ne!(cache_digest(&b), cache_digest(&other_tenant));

        let mut other_level = b.clone();
        other_level.sensitivity = SensitivityLevel::Cui;
        assert_ne!(cache_digest(&b), cache_digest(&other_level));

        assert!(cache_store_key(&b).starts_with("cache:acme:strategy:"));
    }

    #[tokio::test]
    async fn test_store_response_cache_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let cache = StoreResponseCache::new(store.clone(), CacheConfig::default());
        let k = key("Draft a win theme");

        assert!(cache.get(&k).await.unwrap().is_none());

        let entry = CachedEntry {
            content: "Emphasize past performance".to_string(),
            model_used: "claude-sonnet-4-5".to_string(),
            confidence: Confidence::Medium,
            cached_at: Utc::now(),
        };
        cache.put(&k, entry.clone()).await.unwrap();
        assert_eq!(cache.get(&k).await.unwrap(), Some(entry));

        store.set(&cache_store_key(&k), "not json", None).await.unwrap();
        assert!(cache.get(&k).await.unwrap().is_none());
    }

    fn usage(cost: f64, created_at: DateTime<Utc>) -> UsageRecord {
        UsageRecord {
            task: TaskCategory::Chat,
            caller_id: "alice".to_string(),
            company_id: None,
            correlation_id: None,
            tokens_in: 10,
            tokens_out: 20,
            estimated_cost_usd: cost,
            created_at,
            metadata: UsageMetadata {
                model: "claude-haiku-4-5".to_string(),
                backend: BackendId::AskSage,
                sensitivity: SensitivityLevel::Unclassified,
                latency_ms: 5,
                cache_hit: false,
            },
        }
    }

    #[tokio::test]
    async fn test_usage_ledger_spend() {
        let ledger = UsageLedger::new();
        assert_eq!(ledger.spend_since(start_of_month(Utc::now())).await.unwrap(), 0.0);

        for cost in [0.25, 0.5] {
            ledger.record(usage(cost, Utc::now())).await.unwrap();
        }

        assert_eq!(ledger.len().await, 2);
        let spent = ledger.spend_since(start_of_month(Utc::now())).await.unwrap();
        assert!((spent - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_usage_ledger_evicts_previous_month() {
        let ledger = UsageLedger::new();
        let this_month = start_of_month(Utc::now());
        let last_month = this_month - chrono::TimeDelta::days(1);

        ledger.record(usage(5.0, last_month)).await.unwrap();
        ledger.record(usage(2.0, last_month)).await.unwrap();
        assert_eq!(ledger.len().await, 2);

        ledger.record(usage(0.25, Utc::now())).await.unwrap();
        assert_eq!(ledger.len().await, 1);
        let spent = ledger.spend_since(this_month).await.unwrap();
        assert!((spent - 0.25).abs() < 1e-9);

        // Late records for a closed month are neither kept nor counted
        ledger.record(usage(9.0, last_month)).await.unwrap();
        assert_eq!(ledger.len().await, 1);
        let spent = ledger.spend_since(this_month).await.unwrap();
        assert!((spent - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_usage_ledger_total_survives_record_window() {
        let ledger = UsageLedger::with_capacity(2);
        for cost in [1.0, 2.0, 3.0] {
            ledger.record(usage(cost, Utc::now())).await.unwrap();
        }

        let kept: Vec<f64> = ledger
            .records()
            .await
            .iter()
            .map(|r| r.estimated_cost_usd)
            .collect();
        assert_eq!(kept, vec![2.0, 3.0]);

        let spent = ledger.spend_since(start_of_month(Utc::now())).await.unwrap();
        assert!((spent - 6.0).abs() < 1e-9);
    }
}
