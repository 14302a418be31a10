//! Retry-with-backoff shared by the provider clients

use crate::error::BackendError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Maximum backoff duration in milliseconds (30 seconds)
///
/// Prevents unbounded sleeps from exponential overflow. With base=1000ms,
/// attempt 6 would be 32 seconds and is capped to 30s.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Per-backend retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_backoff_ms: u64,
}

impl RetryPolicy {
    /// # Errors
    /// Returns an error if `max_attempts` is 0 (at least 1 attempt is required)
    pub fn new(max_attempts: u32, base_backoff_ms: u64) -> Result<Self, &'static str> {
        if max_attempts == 0 {
            return Err("max_attempts must be at least 1");
        }
        Ok(Self {
            max_attempts,
            base_backoff_ms,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_backoff_ms(&self) -> u64 {
        self.base_backoff_ms
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 1000,
        }
    }
}

/// Exponential backoff for `attempt` (1-based): base * 2^(attempt-1), capped
pub fn calculate_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1);
    policy
        .base_backoff_ms
        .saturating_mul(2_u64.saturating_pow(exponent))
        .min(MAX_BACKOFF_MS)
}

/// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out
pub(crate) async fn with_retry<T, F, Fut>(
    backend: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let backoff = calculate_backoff(policy, attempt);
                let jitter = if backoff > 0 {
                    rand::rng().random_range(0..=backoff / 10)
                } else {
                    0
                };
                tracing::warn!(
                    backend = %backend,
                    attempt,
                    max_attempts = policy.max_attempts,
                    backoff_ms = backoff + jitter,
                    error = %e,
                    "Backend call failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        backend = %backend,
                        attempts = attempt,
                        error = %e,
                        "Backend call failed after exhausting retries"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Map a transport-level reqwest failure into the typed taxonomy
pub(crate) fn transport_error(backend: &str, timeout: Duration, err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout {
            backend: backend.to_string(),
            timeout_seconds: timeout.as_secs(),
        }
    } else if err.is_decode() {
        BackendError::InvalidResponse {
            backend: backend.to_string(),
            reason: err.to_string(),
        }
    } else {
        BackendError::Unavailable {
            backend: backend.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Turn a non-success response into a typed error, keeping the body for diagnostics
pub(crate) async fn status_error(backend: &str, response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    BackendError::from_status(backend, status, truncate(&body, 500))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to build HTTP client with timeout, using defaults");
            reqwest::Client::new()
        })
}
