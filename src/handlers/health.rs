//! Liveness endpoint
//!
//! Always answers 200 while the process is serving; the body summarizes each
//! backend's circuit so load balancers and dashboards can see degradation.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;
use crate::health::{BackendHealth, Health};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// "operational" when at least one configured backend is not down
    pub dispatch_status: &'static str,
    /// "degraded" once any best-effort side effect has failed
    pub side_effects_status: &'static str,
    pub backends: Vec<BackendHealth>,
}

pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let backends = state.health().snapshot().await;
    let any_up = backends
        .iter()
        .any(|b| b.configured && b.health() != Health::Down);

    let side_effects_status = if state.metrics().best_effort_failures_count() > 0 {
        "degraded"
    } else {
        "operational"
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            dispatch_status: if any_up { "operational" } else { "degraded" },
            side_effects_status,
            backends,
        }),
    )
}
