//! Admin-configured primary/fallback backend preference

use crate::backends::BackendId;
use crate::error::{AppError, AppResult};
use crate::store::Store;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const PRIMARY_KEY: &str = "routing:primary";
const FALLBACK_KEY: &str = "routing:fallback";

/// The pair the router uses for unclassified traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PreferencePair {
    pub primary: BackendId,
    pub fallback: BackendId,
}

/// Stored routing preference with config/environment defaults
pub struct RoutingPreferences {
    store: Arc<dyn Store>,
    defaults: PreferencePair,
    ttl: Duration,
}

impl RoutingPreferences {
    pub fn new(store: Arc<dyn Store>, defaults: PreferencePair, ttl: Duration) -> Self {
        Self {
            store,
            defaults,
            ttl,
        }
    }

    pub fn defaults(&self) -> PreferencePair {
        self.defaults
    }

    async fn read(&self, key: &str, default: BackendId) -> BackendId {
        match self.store.get(key).await {
            Ok(Some(raw)) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(key = %key, value = %raw, error = %e, "Ignoring invalid stored routing preference");
                default
            }),
            Ok(None) => default,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Routing preference read failed, using default");
                default
            }
        }
    }

    pub async fn primary(&self) -> BackendId {
        self.read(PRIMARY_KEY, self.defaults.primary).await
    }

    pub async fn fallback(&self) -> BackendId {
        self.read(FALLBACK_KEY, self.defaults.fallback).await
    }

    pub async fn current(&self) -> PreferencePair {
        PreferencePair {
            primary: self.primary().await,
            fallback: self.fallback().await,
        }
    }

    /// Persist a new preference pair
    ///
    /// # Errors
    /// `Validation` when primary and fallback are the same backend; `Store`
    /// when the write fails.
    pub async fn update(&self, primary: BackendId, fallback: BackendId) -> AppResult<PreferencePair> {
        if primary == fallback {
            return Err(AppError::Validation(format!(
                "primary and fallback must be different backends (both are '{}')",
                primary
            )));
        }

        self.store
            .set(PRIMARY_KEY, primary.as_str(), Some(self.ttl))
            .await?;
        self.store
            .set(FALLBACK_KEY, fallback.as_str(), Some(self.ttl))
            .await?;

        tracing::info!(primary = %primary, fallback = %fallback, "Routing preference updated");
        Ok(PreferencePair { primary, fallback })
    }
}
