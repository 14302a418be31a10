//! Monthly spend guard

use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Source of recorded spend (usage records with estimated cost)
#[async_trait]
pub trait SpendSource: Send + Sync {
    /// Total estimated USD spent since `since`
    async fn spend_since(&self, since: DateTime<Utc>) -> AppResult<f64>;
}

/// Current-period budget position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetStatus {
    pub spent: f64,
    pub remaining: f64,
    pub over_threshold: bool,
}

/// Start of the calendar month containing `now`, in UTC
pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[derive(Debug, Clone, Copy)]
struct SpendSnapshot {
    spent: f64,
    period_start: DateTime<Utc>,
    taken_at: Instant,
}

/// Compares current-month spend against a ceiling
///
/// The spend total is reused for `spend_cache_ttl`; a zero TTL recomputes on
/// every check. Snapshots never cross a month boundary.
pub struct BudgetGuard {
    source: Arc<dyn SpendSource>,
    ceiling: f64,
    threshold: f64,
    spend_cache_ttl: Duration,
    snapshot: Mutex<Option<SpendSnapshot>>,
}

impl BudgetGuard {
    pub fn new(
        source: Arc<dyn SpendSource>,
        ceiling: f64,
        threshold: f64,
        spend_cache_ttl: Duration,
    ) -> Self {
        Self {
            source,
            ceiling,
            threshold,
            spend_cache_ttl,
            snapshot: Mutex::new(None),
        }
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    /// Spend position for the current month
    ///
    /// # Errors
    /// Propagates the spend source's failure. Callers decide whether to fail open.
    pub async fn check(&self) -> AppResult<BudgetStatus> {
        let spent = self.current_spend().await?;
        Ok(BudgetStatus {
            spent,
            remaining: self.ceiling - spent,
            over_threshold: spent >= self.ceiling * self.threshold,
        })
    }

    /// Spend position, treating a failed spend query as an untouched budget
    pub async fn check_or_unconstrained(&self) -> (BudgetStatus, bool) {
        match self.check().await {
            Ok(status) => (status, true),
            Err(e) => {
                tracing::warn!(error = %e, "Budget check failed, allowing request");
                (
                    BudgetStatus {
                        spent: 0.0,
                        remaining: self.ceiling,
                        over_threshold: false,
                    },
                    false,
                )
            }
        }
    }

    async fn current_spend(&self) -> AppResult<f64> {
        let now = Utc::now();
        let period_start = start_of_month(now);

        let mut snapshot = self.snapshot.lock().await;
        if let Some(cached) = *snapshot
            && cached.period_start == period_start
            && cached.taken_at.elapsed() < self.spend_cache_ttl
        {
            return Ok(cached.spent);
        }

        let spent = self.source.spend_since(period_start).await?;
        *snapshot = Some(SpendSnapshot {
            spent,
            period_start,
            taken_at: Instant::now(),
        });
        Ok(spent)
    }
}
