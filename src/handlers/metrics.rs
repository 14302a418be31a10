//! Prometheus metrics endpoint

use axum::{extract::State, http::StatusCode};

use crate::handlers::AppState;

/// Render every metric in the Prometheus text format
///
/// ```bash
/// curl http://localhost:3000/metrics
/// # HELP clearance_router_requests_total Total dispatch requests by sensitivity level and outcome
/// # TYPE clearance_router_requests_total counter
/// clearance_router_requests_total{outcome="served",sensitivity="CUI"} 7
/// ```
pub async fn handler(State(state): State<AppState>) -> (StatusCode, String) {
    match state.metrics().gather() {
        Ok(output) => (StatusCode::OK, output),
        Err(e) => {
            tracing::error!(error = %e, "Failed to gather metrics for Prometheus scraping");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to gather metrics: {}", e),
            )
        }
    }
}
