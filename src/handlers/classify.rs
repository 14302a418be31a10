//! POST /v1/classify

use super::{AppState, bearer_token};
use crate::classification::ClassificationResult;
use crate::error::AppError;
use axum::http::HeaderMap;
use axum::{Json, extract::State};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub content: String,
    #[serde(default)]
    pub context: Option<String>,
}

/// Classify text without dispatching it
pub async fn handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ClassifyRequest>,
) -> Result<Json<ClassificationResult>, AppError> {
    state
        .orchestrator()
        .authenticate(bearer_token(&headers))
        .await?;

    let result = state
        .orchestrator()
        .engine()
        .classify(&request.content, request.context.as_deref());
    state.metrics().record_classification(result.level);
    Ok(Json(result))
}
