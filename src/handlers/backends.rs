//! Backend status and administration endpoints

use super::{AppState, bearer_token};
use crate::backends::BackendId;
use crate::error::AppError;
use crate::health::CircuitState;
use crate::routing::{BackendStatus, PreferencePair};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct BackendList {
    pub routing: PreferencePair,
    pub backends: Vec<BackendStatus>,
}

/// GET /v1/backends
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BackendList>, AppError> {
    state
        .orchestrator()
        .authenticate(bearer_token(&headers))
        .await?;

    Ok(Json(BackendList {
        routing: state.router().preferences().current().await,
        backends: state.router().statuses().await,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RoutingUpdate {
    pub primary: BackendId,
    pub fallback: BackendId,
}

/// PUT /v1/backends/routing (admin roles only)
pub async fn update_routing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<RoutingUpdate>,
) -> Result<Json<PreferencePair>, AppError> {
    let admin = state.require_admin(&headers, "routing").await?;
    let pair = state
        .router()
        .preferences()
        .update(update.primary, update.fallback)
        .await?;
    tracing::info!(
        caller_id = %admin.caller_id,
        primary = %pair.primary,
        fallback = %pair.fallback,
        "Routing preference changed by admin"
    );
    Ok(Json(pair))
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub backend: BackendId,
    pub state: CircuitState,
}

/// POST /v1/backends/{id}/reset (admin roles only)
pub async fn reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ResetResponse>, AppError> {
    let admin = state.require_admin(&headers, "circuit reset").await?;
    let backend: BackendId = id.parse().map_err(AppError::Validation)?;

    state.health().reset(backend).await;
    tracing::info!(caller_id = %admin.caller_id, backend = %backend, "Circuit reset by admin");

    Ok(Json(ResetResponse {
        backend,
        state: state.health().get_state(backend).await,
    }))
}
