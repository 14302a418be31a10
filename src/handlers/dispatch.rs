//! POST /v1/dispatch

use super::{AppState, bearer_token};
use crate::error::AppError;
use crate::middleware::RequestId;
use crate::orchestrator::{RequestOptions, ResponseEnvelope};
use axum::http::HeaderMap;
use axum::{Extension, Json, extract::State};

/// Dispatch a request through the pipeline
///
/// Returns 401/403 for access failures. Backend and infrastructure failures
/// still answer 200 with a degraded envelope (`backend_used = "none"`).
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(options): Json<RequestOptions>,
) -> Result<Json<ResponseEnvelope>, AppError> {
    tracing::debug!(
        request_id = %request_id,
        task = %options.task,
        prompt_chars = options.prompt.chars().count(),
        "Received dispatch request"
    );

    let envelope = state
        .orchestrator()
        .handle(bearer_token(&headers), options)
        .await?;

    tracing::info!(
        request_id = %request_id,
        backend = %envelope.backend_used,
        model = %envelope.model_used,
        sensitivity = %envelope.sensitivity,
        cached = envelope.cached,
        latency_ms = envelope.latency_ms,
        "Dispatch completed"
    );
    Ok(Json(envelope))
}
