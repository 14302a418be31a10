//! Command-line interface for clearance-router

use clap::{Parser, Subcommand};

/// Compliance-aware dispatch layer for hosted LLM backends
#[derive(Parser)]
#[command(name = "clearance-router")]
#[command(version)]
#[command(about = "Compliance-aware dispatch layer for hosted LLM backends")]
#[command(
    long_about = "clearance-router classifies each request for sensitivity markings, \
    selects a model under budget constraints, and routes sensitive content only to \
    compliance-authorized backends, failing over and degrading gracefully."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Classify text and print the result as JSON
    Classify {
        /// Text to classify
        text: String,

        /// Additional context classified together with the text
        #[arg(long)]
        context: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# clearance-router configuration
# ==============================
#
# Every section is optional; the values below are the defaults unless noted.
# Backend API keys are read from the environment variables named here, never
# from this file.

# ─────────────────────────────────────────────────────────────────────────────
# SERVER
# ─────────────────────────────────────────────────────────────────────────────

[server]
host = "0.0.0.0"
port = 3000

# Overall bound on routed execution, failover included (1-300)
request_timeout_seconds = 60

# ─────────────────────────────────────────────────────────────────────────────
# BACKENDS
# ─────────────────────────────────────────────────────────────────────────────
#
# Ask Sage is the only compliance-authorized backend: CUI, CUI-RESTRICTED and
# OPSEC content is never sent anywhere else.
#
# Fields (all optional):
#   - base_url: provider API root (http or https)
#   - api_key_env: environment variable holding the API key
#   - query_timeout_seconds: per-attempt query timeout (1-300)
#   - probe_timeout_seconds: health probe timeout (1-30)
#   - max_attempts: attempts per backend for retryable failures (1-10)
#   - retry_backoff_ms: base for exponential backoff between attempts
#   - default_model: model used when a request names another provider's model

[backends.asksage]
base_url = "https://api.asksage.ai/v1"
api_key_env = "ASKSAGE_API_KEY"
query_timeout_seconds = 30
probe_timeout_seconds = 5
max_attempts = 3

[backends.anthropic]
api_key_env = "ANTHROPIC_API_KEY"
query_timeout_seconds = 60
probe_timeout_seconds = 10
max_attempts = 2

[backends.openai]
api_key_env = "OPENAI_API_KEY"
default_model = "gpt-4o"

# ─────────────────────────────────────────────────────────────────────────────
# ROUTING (unclassified traffic)
# ─────────────────────────────────────────────────────────────────────────────
#
# Overridden by ROUTER_PRIMARY_BACKEND / ROUTER_FALLBACK_BACKEND, and at
# runtime by admins through PUT /v1/backends/routing.

[routing]
primary = "asksage"
fallback = "anthropic"
preference_ttl_seconds = 2592000

# ─────────────────────────────────────────────────────────────────────────────
# BUDGET
# ─────────────────────────────────────────────────────────────────────────────

[budget]
# Overridden by ROUTER_MONTHLY_BUDGET_USD
monthly_ceiling_usd = 500.0

# Fraction of the ceiling after which tasks downgrade to their fallback model
downgrade_threshold = 0.75

# How long a spend total is reused (0 recomputes on every request)
spend_cache_seconds = 30

# ─────────────────────────────────────────────────────────────────────────────
# HEALTH
# ─────────────────────────────────────────────────────────────────────────────

[health]
# Background probe interval; 0 disables background probing
probe_interval_seconds = 60

# ─────────────────────────────────────────────────────────────────────────────
# STORE
# ─────────────────────────────────────────────────────────────────────────────
#
# Without a Redis URL, circuit state, routing preferences and cached responses
# live in process memory. Overridden by ROUTER_REDIS_URL.

[store]
# redis_url = "redis://127.0.0.1:6379"
key_prefix = "clearance-router:"

# ─────────────────────────────────────────────────────────────────────────────
# RESPONSE CACHE
# ─────────────────────────────────────────────────────────────────────────────

[cache]
enabled = true
default_ttl_seconds = 86400

[cache.task_ttl_seconds]
pricing = 3600
strategy = 14400
chat = 14400
capture = 43200
orals = 43200

# ─────────────────────────────────────────────────────────────────────────────
# ACCESS CONTROL
# ─────────────────────────────────────────────────────────────────────────────

[access]
# Tasks any authenticated caller may run
ungated_tasks = ["chat", "summarize", "classify"]

# Roles that may change routing preferences and reset circuits
admin_roles = ["admin"]

[access.roles]
admin = ["strategy", "compliance", "capture", "writer", "contracts", "orals", "pricing"]
capture_manager = ["strategy", "capture", "writer", "orals"]
pricer = ["pricing", "contracts"]

# ─────────────────────────────────────────────────────────────────────────────
# CALLERS AND COMPANIES
# ─────────────────────────────────────────────────────────────────────────────
#
# Static bearer-token table. Replace these tokens before deploying.

[[callers]]
token = "change-me-admin-token"
id = "admin"
company_id = "example-co"
role = "admin"

[[companies]]
id = "example-co"
monthly_token_allotment = 2000000

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG wins when set)
log_level = "info"

# Prometheus metrics are served at /metrics on the server port
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn default_config_path() {
        let cli = Cli::parse_from(["clearance-router"]);
        assert_eq!(cli.config, "config.toml");
        assert!(cli.command.is_none());
    }

    #[test]
    fn custom_config_path() {
        let cli = Cli::parse_from(["clearance-router", "serve", "--config", "custom.toml"]);
        assert_eq!(cli.config, "custom.toml");
        assert!(matches!(cli.command, Some(Command::Serve)));
    }

    #[test]
    fn config_subcommand_with_output() {
        let cli = Cli::parse_from(["clearance-router", "config", "-o", "my-config.toml"]);
        assert!(matches!(
            cli.command,
            Some(Command::Config { output: Some(ref path) }) if path == "my-config.toml"
        ));
    }

    #[test]
    fn classify_subcommand() {
        let cli = Cli::parse_from([
            "clearance-router",
            "classify",
            "Our wrap rate is 1.8",
            "--context",
            "volume 3",
        ]);
        assert!(matches!(
            cli.command,
            Some(Command::Classify { ref text, context: Some(ref ctx) })
                if text == "Our wrap rate is 1.8" && ctx == "volume 3"
        ));
    }

    #[test]
    fn template_is_valid_toml() {
        let template = generate_config_template();
        let result: Result<toml::Value, _> = toml::from_str(template);
        assert!(
            result.is_ok(),
            "Template should be valid TOML: {:?}",
            result.err()
        );
    }

    #[test]
    fn template_loads_and_validates() {
        let config: crate::config::Config = generate_config_template().parse().unwrap();
        config.validate().unwrap();
        assert_eq!(config.callers.len(), 1);
        assert_eq!(config.companies[0].monthly_token_allotment, 2_000_000);
    }
}
