//! Bucket operation handlers

use crate::{ApiError, AppState, ErrorCode};
use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    response::{IntoResponse, Response},
};
use bucketgate_core::{CancellationToken, Outcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Query parameters for bucket creation
#[derive(Debug, Deserialize)]
pub struct CreateBucketParams {
    #[serde(alias = "bucketName")]
    pub name: Option<String>,
}

/// Result of a bucket mutation
#[derive(Debug, Serialize)]
pub struct BucketStatus {
    pub bucket: String,
    pub status: &'static str,
}

/// POST /buckets?name={bucket} - Create a bucket
pub async fn create_bucket(
    State(state): State<Arc<AppState>>,
    Extension(cancel): Extension<CancellationToken>,
    Query(params): Query<CreateBucketParams>,
) -> Result<Response, ApiError> {
    let name = params
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ApiError::new(ErrorCode::InvalidRequest, "Missing query parameter 'name'"))?;

    let status = match state.gateway.create_bucket(&name, &cancel).await? {
        Outcome::Success(()) => "created",
        Outcome::AlreadyExists(_) => "already_exists",
        other => return Err(ApiError::from_outcome(other, ErrorCode::NoSuchBucket)),
    };

    Ok(Json(BucketStatus { bucket: name, status }).into_response())
}

/// DELETE /buckets/{bucket} - Delete a bucket
pub async fn delete_bucket(
    State(state): State<Arc<AppState>>,
    Extension(cancel): Extension<CancellationToken>,
    Path(bucket): Path<String>,
) -> Result<Response, ApiError> {
    match state.gateway.delete_bucket(&bucket, &cancel).await? {
        Outcome::Success(()) => Ok(Json(BucketStatus {
            bucket,
            status: "deleted",
        })
        .into_response()),
        other => Err(ApiError::from_outcome(other, ErrorCode::NoSuchBucket)),
    }
}
