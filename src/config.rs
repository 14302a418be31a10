//! Configuration management for the dispatch layer
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Loading happens in three phases (read, parse, validate); environment
//! overrides are applied between parsing and the final validation.

use crate::backends::{BackendId, RetryPolicy};
use crate::error::{AppError, AppResult};
use crate::models::TaskCategory;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable overriding the default primary backend
pub const ENV_PRIMARY_BACKEND: &str = "ROUTER_PRIMARY_BACKEND";
/// Environment variable overriding the default fallback backend
pub const ENV_FALLBACK_BACKEND: &str = "ROUTER_FALLBACK_BACKEND";
/// Environment variable overriding the monthly spend ceiling
pub const ENV_MONTHLY_BUDGET: &str = "ROUTER_MONTHLY_BUDGET_USD";
/// Environment variable overriding the Redis connection URL
pub const ENV_REDIS_URL: &str = "ROUTER_REDIS_URL";

const MAX_REQUEST_TIMEOUT_SECONDS: u64 = 300;
const MAX_PROBE_TIMEOUT_SECONDS: u64 = 30;
const MAX_ATTEMPTS: u32 = 10;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub callers: Vec<CallerEntry>,
    #[serde(default)]
    pub companies: Vec<CompanyEntry>,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Overall deadline for the routed backend execution of one dispatch
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    /// Listen address; `host` must be an IP address literal
    pub fn socket_addr(&self) -> AppResult<SocketAddr> {
        let ip = self.host.parse::<IpAddr>().map_err(|_| {
            AppError::Config(format!(
                "server.host must be an IP address such as 127.0.0.1 or 0.0.0.0, got '{}'",
                self.host
            ))
        })?;
        Ok(SocketAddr::from((ip, self.port)))
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    60
}

/// Per-provider overrides as written in the file
///
/// Omitted fields take the provider's own defaults (see [`BackendSettings`]).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BackendOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub asksage: BackendOverrides,
    #[serde(default)]
    pub anthropic: BackendOverrides,
    #[serde(default)]
    pub openai: BackendOverrides,
}

impl BackendsConfig {
    fn overrides(&self, id: BackendId) -> &BackendOverrides {
        match id {
            BackendId::AskSage => &self.asksage,
            BackendId::Anthropic => &self.anthropic,
            BackendId::OpenAi => &self.openai,
        }
    }
}

/// Resolved settings for one provider client
///
/// Fields are private; instances come from [`Config::backend`] or
/// [`BackendSettings::defaults`], so the values have passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    id: BackendId,
    base_url: String,
    api_key_env: String,
    query_timeout_seconds: u64,
    probe_timeout_seconds: u64,
    max_attempts: u32,
    retry_backoff_ms: u64,
    default_model: Option<String>,
}

impl BackendSettings {
    /// Provider defaults before any file overrides
    pub fn defaults(id: BackendId) -> Self {
        match id {
            BackendId::AskSage => Self {
                id,
                base_url: "https://api.asksage.ai/v1".to_string(),
                api_key_env: "ASKSAGE_API_KEY".to_string(),
                query_timeout_seconds: 30,
                probe_timeout_seconds: 5,
                max_attempts: 3,
                retry_backoff_ms: 1000,
                default_model: None,
            },
            BackendId::Anthropic => Self {
                id,
                base_url: "https://api.anthropic.com/v1".to_string(),
                api_key_env: "ANTHROPIC_API_KEY".to_string(),
                query_timeout_seconds: 60,
                probe_timeout_seconds: 10,
                max_attempts: 2,
                retry_backoff_ms: 1000,
                default_model: None,
            },
            BackendId::OpenAi => Self {
                id,
                base_url: "https://api.openai.com/v1".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                query_timeout_seconds: 60,
                probe_timeout_seconds: 5,
                max_attempts: 2,
                retry_backoff_ms: 1000,
                default_model: Some("gpt-4o".to_string()),
            },
        }
    }

    fn resolve(id: BackendId, overrides: &BackendOverrides) -> Self {
        let defaults = Self::defaults(id);
        Self {
            id,
            base_url: overrides
                .base_url
                .clone()
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_key_env: overrides.api_key_env.clone().unwrap_or(defaults.api_key_env),
            query_timeout_seconds: overrides
                .query_timeout_seconds
                .unwrap_or(defaults.query_timeout_seconds),
            probe_timeout_seconds: overrides
                .probe_timeout_seconds
                .unwrap_or(defaults.probe_timeout_seconds),
            max_attempts: overrides.max_attempts.unwrap_or(defaults.max_attempts),
            retry_backoff_ms: overrides
                .retry_backoff_ms
                .unwrap_or(defaults.retry_backoff_ms),
            default_model: overrides.default_model.clone().or(defaults.default_model),
        }
    }

    /// Point the client at a different base URL (used against mock servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override retry settings; `max_attempts` of 0 is raised to 1
    pub fn with_retry(mut self, max_attempts: u32, retry_backoff_ms: u64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff_ms = retry_backoff_ms;
        self
    }

    pub fn with_timeouts(mut self, query_seconds: u64, probe_seconds: u64) -> Self {
        self.query_timeout_seconds = query_seconds;
        self.probe_timeout_seconds = probe_seconds;
        self
    }

    pub fn id(&self) -> BackendId {
        self.id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Name of the environment variable holding the API key
    pub fn api_key_env(&self) -> &str {
        &self.api_key_env
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_backoff_ms).unwrap_or_default()
    }
}

/// Routing preference defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
    #[serde(default = "default_primary_backend")]
    pub primary: BackendId,
    #[serde(default = "default_fallback_backend")]
    pub fallback: BackendId,
    /// How long an admin-updated preference persists in the store
    #[serde(default = "default_preference_ttl")]
    pub preference_ttl_seconds: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_backend(),
            fallback: default_fallback_backend(),
            preference_ttl_seconds: default_preference_ttl(),
        }
    }
}

fn default_primary_backend() -> BackendId {
    BackendId::AskSage
}

fn default_fallback_backend() -> BackendId {
    BackendId::Anthropic
}

fn default_preference_ttl() -> u64 {
    30 * 24 * 60 * 60
}

/// Monthly spend governance
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BudgetConfig {
    #[serde(default = "default_monthly_ceiling")]
    pub monthly_ceiling_usd: f64,
    /// Fraction of the ceiling at which selection downgrades to fallback models
    #[serde(default = "default_downgrade_threshold")]
    pub downgrade_threshold: f64,
    /// How long a computed spend total is reused; 0 recomputes on every call
    #[serde(default = "default_spend_cache_seconds")]
    pub spend_cache_seconds: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            monthly_ceiling_usd: default_monthly_ceiling(),
            downgrade_threshold: default_downgrade_threshold(),
            spend_cache_seconds: default_spend_cache_seconds(),
        }
    }
}

fn default_monthly_ceiling() -> f64 {
    500.0
}

fn default_downgrade_threshold() -> f64 {
    0.75
}

fn default_spend_cache_seconds() -> u64 {
    30
}

/// Background health probing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    /// Seconds between background probe rounds; 0 disables background probes
    #[serde(default = "default_probe_interval")]
    pub probe_interval_seconds: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval_seconds: default_probe_interval(),
        }
    }
}

fn default_probe_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Durable store; omitted means process-local state only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_key_prefix() -> String {
    "clearance-router:".to_string()
}

/// Response cache settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_seconds: u64,
    /// Per-task TTL overrides keyed by task category name
    #[serde(default = "default_task_ttls")]
    pub task_ttl_seconds: HashMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: default_cache_ttl(),
            task_ttl_seconds: default_task_ttls(),
        }
    }
}

impl CacheConfig {
    /// TTL for cached responses of `task`
    pub fn ttl_for(&self, task: &TaskCategory) -> Duration {
        let seconds = self
            .task_ttl_seconds
            .get(task.as_str())
            .copied()
            .unwrap_or(self.default_ttl_seconds);
        Duration::from_secs(seconds)
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    24 * 60 * 60
}

fn default_task_ttls() -> HashMap<String, u64> {
    const HOUR: u64 = 60 * 60;
    HashMap::from([
        ("pricing".to_string(), HOUR),
        ("strategy".to_string(), 4 * HOUR),
        ("chat".to_string(), 4 * HOUR),
        ("capture".to_string(), 12 * HOUR),
        ("orals".to_string(), 12 * HOUR),
    ])
}

/// Agent access control
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccessConfig {
    /// Tasks any authenticated caller may use
    #[serde(default = "default_ungated_tasks")]
    pub ungated_tasks: Vec<String>,
    /// Roles allowed to change routing preferences and reset circuits
    #[serde(default = "default_admin_roles")]
    pub admin_roles: Vec<String>,
    /// Role name to allowed task list
    #[serde(default)]
    pub roles: HashMap<String, Vec<String>>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            ungated_tasks: default_ungated_tasks(),
            admin_roles: default_admin_roles(),
            roles: HashMap::new(),
        }
    }
}

fn default_ungated_tasks() -> Vec<String> {
    vec![
        "chat".to_string(),
        "summarize".to_string(),
        "classify".to_string(),
    ]
}

fn default_admin_roles() -> Vec<String> {
    vec!["admin".to_string()]
}

/// One entry of the static credential table
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallerEntry {
    pub token: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompanyEntry {
    pub id: String,
    pub monthly_token_allotment: u64,
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self = toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
            path: path_display.clone(),
            source,
        })?;

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Resolved client settings for a provider
    pub fn backend(&self, id: BackendId) -> BackendSettings {
        BackendSettings::resolve(id, self.backends.overrides(id))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    /// Apply environment overrides through `lookup`
    ///
    /// Takes a lookup function instead of reading the process environment so
    /// callers (and tests) control the source. Unparseable values are
    /// rejected rather than ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_PRIMARY_BACKEND) {
            self.routing.primary = value
                .parse()
                .map_err(|e| AppError::Config(format!("{}: {}", ENV_PRIMARY_BACKEND, e)))?;
        }
        if let Some(value) = lookup(ENV_FALLBACK_BACKEND) {
            self.routing.fallback = value
                .parse()
                .map_err(|e| AppError::Config(format!("{}: {}", ENV_FALLBACK_BACKEND, e)))?;
        }
        if let Some(value) = lookup(ENV_MONTHLY_BUDGET) {
            self.budget.monthly_ceiling_usd = value.trim().parse().map_err(|_| {
                AppError::Config(format!(
                    "{} must be a number, got '{}'",
                    ENV_MONTHLY_BUDGET, value
                ))
            })?;
        }
        if let Some(value) = lookup(ENV_REDIS_URL)
            && !value.trim().is_empty()
        {
            self.store.redis_url = Some(value.trim().to_string());
        }
        Ok(())
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()`, but can also be called
    /// explicitly after `apply_overrides()` or when building a Config in code.
    pub fn validate(&self) -> AppResult<()> {
        self.server.socket_addr()?;

        let timeout = self.server.request_timeout_seconds;
        if timeout == 0 || timeout > MAX_REQUEST_TIMEOUT_SECONDS {
            return Err(AppError::Config(format!(
                "server.request_timeout_seconds must be in (0, {}], got {}",
                MAX_REQUEST_TIMEOUT_SECONDS, timeout
            )));
        }

        for id in BackendId::ALL {
            let overrides = self.backends.overrides(id);
            let settings = self.backend(id);

            if !(settings.base_url.starts_with("http://")
                || settings.base_url.starts_with("https://"))
            {
                return Err(AppError::Config(format!(
                    "backends.{}.base_url must start with http:// or https://, got '{}'",
                    id, settings.base_url
                )));
            }
            if settings.api_key_env.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "backends.{}.api_key_env must not be empty",
                    id
                )));
            }
            if settings.query_timeout_seconds == 0
                || settings.query_timeout_seconds > MAX_REQUEST_TIMEOUT_SECONDS
            {
                return Err(AppError::Config(format!(
                    "backends.{}.query_timeout_seconds must be in (0, {}], got {}",
                    id, MAX_REQUEST_TIMEOUT_SECONDS, settings.query_timeout_seconds
                )));
            }
            if settings.probe_timeout_seconds == 0
                || settings.probe_timeout_seconds > MAX_PROBE_TIMEOUT_SECONDS
            {
                return Err(AppError::Config(format!(
                    "backends.{}.probe_timeout_seconds must be in (0, {}], got {}",
                    id, MAX_PROBE_TIMEOUT_SECONDS, settings.probe_timeout_seconds
                )));
            }
            if let Some(attempts) = overrides.max_attempts
                && (attempts == 0 || attempts > MAX_ATTEMPTS)
            {
                return Err(AppError::Config(format!(
                    "backends.{}.max_attempts must be in [1, {}], got {}",
                    id, MAX_ATTEMPTS, attempts
                )));
            }
        }

        if self.routing.primary == self.routing.fallback {
            return Err(AppError::Config(format!(
                "routing.primary and routing.fallback must differ (both are '{}')",
                self.routing.primary
            )));
        }

        let ceiling = self.budget.monthly_ceiling_usd;
        if !ceiling.is_finite() || ceiling <= 0.0 {
            return Err(AppError::Config(format!(
                "budget.monthly_ceiling_usd must be a positive finite number, got {}",
                ceiling
            )));
        }
        let threshold = self.budget.downgrade_threshold;
        if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
            return Err(AppError::Config(format!(
                "budget.downgrade_threshold must be in (0, 1], got {}",
                threshold
            )));
        }

        if let Some(url) = &self.store.redis_url
            && !(url.starts_with("redis://") || url.starts_with("rediss://"))
        {
            return Err(AppError::Config(format!(
                "store.redis_url must start with redis:// or rediss://, got '{}'",
                url
            )));
        }

        for task in self.cache.task_ttl_seconds.keys() {
            validate_task_name("cache.task_ttl_seconds", task)?;
        }
        for task in &self.access.ungated_tasks {
            validate_task_name("access.ungated_tasks", task)?;
        }
        for (role, tasks) in &self.access.roles {
            for task in tasks {
                validate_task_name(&format!("access.roles.{}", role), task)?;
            }
        }

        let mut tokens = HashSet::new();
        for caller in &self.callers {
            if caller.token.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "caller '{}' has an empty token",
                    caller.id
                )));
            }
            if !tokens.insert(caller.token.as_str()) {
                return Err(AppError::Config(format!(
                    "caller '{}' reuses a token already assigned to another caller",
                    caller.id
                )));
            }
        }

        for company in &self.companies {
            if company.monthly_token_allotment == 0 {
                return Err(AppError::Config(format!(
                    "company '{}' has a monthly_token_allotment of 0",
                    company.id
                )));
            }
        }

        Ok(())
    }
}

fn validate_task_name(section: &str, task: &str) -> AppResult<()> {
    let Ok(parsed) = TaskCategory::from_str(task);
    match parsed {
        TaskCategory::Other(_) => Err(AppError::Config(format!(
            "{} names unknown task '{}'",
            section, task
        ))),
        _ => Ok(()),
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 8080
request_timeout_seconds = 45

[backends.asksage]
base_url = "https://asksage.example.gov/v1/"
max_attempts = 4

[routing]
primary = "anthropic"
fallback = "openai"

[budget]
monthly_ceiling_usd = 250.0

[access]
admin_roles = ["owner"]

[access.roles]
capture_manager = ["capture", "strategy"]

[[callers]]
token = "tok-1"
id = "user-1"
company_id = "acme"
role = "capture_manager"

[[companies]]
id = "acme"
monthly_token_allotment = 1000000
"#;

    #[test]
    fn test_parses_full_config() {
        let config: Config = TEST_CONFIG.parse().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.request_timeout(), Duration::from_secs(45));
        assert_eq!(config.routing.primary, BackendId::Anthropic);
        assert_eq!(config.routing.fallback, BackendId::OpenAi);
        assert_eq!(config.budget.monthly_ceiling_usd, 250.0);
        assert_eq!(config.budget.downgrade_threshold, 0.75);
        assert_eq!(config.callers.len(), 1);
        assert_eq!(config.access.roles["capture_manager"].len(), 2);
    }

    #[test]
    fn test_backend_settings_merge_overrides_with_defaults() {
        let config: Config = TEST_CONFIG.parse().unwrap();
        let asksage = config.backend(BackendId::AskSage);
        assert_eq!(asksage.base_url(), "https://asksage.example.gov/v1");
        assert_eq!(asksage.retry_policy().max_attempts(), 4);
        assert_eq!(asksage.query_timeout(), Duration::from_secs(30));
        assert_eq!(asksage.api_key_env(), "ASKSAGE_API_KEY");

        let anthropic = config.backend(BackendId::Anthropic);
        assert_eq!(anthropic.probe_timeout(), Duration::from_secs(10));
        assert_eq!(anthropic.retry_policy().max_attempts(), 2);

        let openai = config.backend(BackendId::OpenAi);
        assert_eq!(openai.default_model(), Some("gpt-4o"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config.routing.primary, BackendId::AskSage);
        assert_eq!(config.routing.fallback, BackendId::Anthropic);
        assert_eq!(config.budget.monthly_ceiling_usd, 500.0);
        assert_eq!(config.server.request_timeout_seconds, 60);
        assert!(config.store.redis_url.is_none());
        assert_eq!(
            config.cache.ttl_for(&TaskCategory::Pricing),
            Duration::from_secs(3600)
        );
        assert_eq!(
            config.cache.ttl_for(&TaskCategory::Compliance),
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        let env = HashMap::from([
            (ENV_PRIMARY_BACKEND, "openai"),
            (ENV_FALLBACK_BACKEND, "asksage"),
            (ENV_MONTHLY_BUDGET, "1200"),
            (ENV_REDIS_URL, "redis://cache:6379"),
        ]);
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.routing.primary, BackendId::OpenAi);
        assert_eq!(config.routing.fallback, BackendId::AskSage);
        assert_eq!(config.budget.monthly_ceiling_usd, 1200.0);
        assert_eq!(config.store.redis_url.as_deref(), Some("redis://cache:6379"));
        config.validate().unwrap();
    }

    #[test]
    fn test_apply_overrides_rejects_garbage() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == ENV_MONTHLY_BUDGET).then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(AppError::Config(_))));

        let result = config.apply_overrides(|key| {
            (key == ENV_PRIMARY_BACKEND).then(|| "bedrock".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejections() {
        let cases = [
            "[server]\nhost = \"localhost\"",
            "[server]\nrequest_timeout_seconds = 0",
            "[server]\nrequest_timeout_seconds = 301",
            "[backends.openai]\nbase_url = \"ftp://x\"",
            "[backends.anthropic]\nprobe_timeout_seconds = 31",
            "[backends.asksage]\nmax_attempts = 0",
            "[routing]\nprimary = \"openai\"\nfallback = \"openai\"",
            "[budget]\nmonthly_ceiling_usd = 0.0",
            "[budget]\ndowngrade_threshold = 1.5",
            "[store]\nredis_url = \"http://localhost\"",
            "[access]\nungated_tasks = [\"karaoke\"]",
            "[access.roles]\nviewer = [\"chat\", \"bogus\"]",
            "[[callers]]\ntoken = \"t\"\nid = \"a\"\nrole = \"r\"\n[[callers]]\ntoken = \"t\"\nid = \"b\"\nrole = \"r\"",
            "[[companies]]\nid = \"acme\"\nmonthly_token_allotment = 0",
        ];

        for toml in cases {
            assert!(
                matches!(toml.parse::<Config>(), Err(AppError::Config(_))),
                "expected validation failure for:\n{}",
                toml
            );
        }
    }

    #[test]
    fn test_server_socket_addr() {
        let config: Config = "[server]\nhost = \"127.0.0.1\"\nport = 8088".parse().unwrap();
        assert_eq!(
            config.server.socket_addr().unwrap(),
            SocketAddr::from(([127, 0, 0, 1], 8088))
        );

        let config: Config = "[server]\nhost = \"::1\"".parse().unwrap();
        assert!(config.server.socket_addr().unwrap().is_ipv6());

        let server = ServerConfig {
            host: "localhost".to_string(),
            ..ServerConfig::default()
        };
        let err = server.socket_addr().unwrap_err();
        assert!(err.to_string().contains("server.host"), "{}", err);
    }

    #[test]
    fn test_unknown_backend_is_a_parse_error() {
        let result = "[routing]\nprimary = \"bedrock\"".parse::<Config>();
        assert!(matches!(result, Err(AppError::ConfigParseFailed { .. })));
    }
}
