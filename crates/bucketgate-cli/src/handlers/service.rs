//! Service-level handlers (ListBuckets, health)

use crate::{ApiError, AppState, ErrorCode};
use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bucketgate_core::{CancellationToken, Outcome};
use std::sync::Arc;

/// GET /buckets - List all buckets
pub async fn list_buckets(
    State(state): State<Arc<AppState>>,
    Extension(cancel): Extension<CancellationToken>,
) -> Result<Response, ApiError> {
    match state.gateway.list_buckets(&cancel).await {
        Outcome::Success(buckets) => Ok(Json(buckets).into_response()),
        other => Err(ApiError::from_outcome(other, ErrorCode::NoSuchBucket)),
    }
}

/// GET /health - Health check
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
