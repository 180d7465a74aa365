//! Object operation handlers

use crate::{ApiError, AppState, ErrorCode};
use axum::{
    Json,
    body::Body,
    extract::{Extension, Multipart, Path, Query, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bucketgate_backend::{ObjectDownload, ShareLink};
use bucketgate_core::{CancellationToken, ItemFailure, Outcome, ShareListing};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Multipart field carrying the upload
const FILE_FIELD: &str = "file";

/// Query parameters selecting a folder
#[derive(Debug, Default, Deserialize)]
pub struct FolderParams {
    #[serde(alias = "folderName")]
    pub folder: Option<String>,
}

/// Query parameters of a memory-mode share link
#[derive(Debug, Deserialize)]
pub struct ShareParams {
    pub expires: i64,
    pub signature: String,
}

/// Result of an upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub bucket: String,
    pub key: String,
}

/// One listed object with its share link
#[derive(Debug, Serialize)]
pub struct ListedObject {
    pub name: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

impl From<ShareLink> for ListedObject {
    fn from(link: ShareLink) -> Self {
        Self {
            name: link.key,
            url: link.url,
            expires_at: link.expires_at,
        }
    }
}

/// One failed item of a listing
#[derive(Debug, Serialize)]
pub struct ListingFailure {
    pub key: String,
    pub kind: &'static str,
    pub message: String,
}

impl From<ItemFailure> for ListingFailure {
    fn from(failure: ItemFailure) -> Self {
        Self {
            key: failure.key,
            kind: failure.error.kind.as_str(),
            message: failure.error.message,
        }
    }
}

/// Object listing with share links
#[derive(Debug, Serialize)]
pub struct ListingResponse {
    pub bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    pub empty: bool,
    pub items: Vec<ListedObject>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ListingFailure>,
}

impl ListingResponse {
    fn new(bucket: String, folder: Option<String>, listing: ShareListing, failures: Vec<ItemFailure>) -> Self {
        let empty = listing.is_empty();
        let items: Vec<ListedObject> = match listing {
            ShareListing::Empty => Vec::new(),
            ShareListing::Links(links) => links.into_iter().map(ListedObject::from).collect(),
        };
        Self {
            bucket,
            folder,
            empty,
            items,
            failures: failures.into_iter().map(ListingFailure::from).collect(),
        }
    }
}

/// Result of an object deletion
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub bucket: String,
    pub key: String,
    pub status: &'static str,
}

/// POST /buckets/{bucket}/objects?folder={folder} - Upload a file
pub async fn upload_object(
    State(state): State<Arc<AppState>>,
    Extension(cancel): Extension<CancellationToken>,
    Path(bucket): Path<String>,
    Query(params): Query<FolderParams>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(base_name)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::new(ErrorCode::InvalidRequest, "The file field has no filename"))?;
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| mime_guess::from_path(&filename).first_or_octet_stream().to_string());
        let data = field.bytes().await.map_err(multipart_error)?;

        upload = Some((filename, content_type, data));
        break;
    }

    let Some((filename, content_type, data)) = upload else {
        return Err(ApiError::new(
            ErrorCode::InvalidRequest,
            format!("Missing multipart field '{}'", FILE_FIELD),
        ));
    };

    match state
        .gateway
        .upload_object(&bucket, params.folder.as_deref(), &filename, &content_type, data, &cancel)
        .await?
    {
        Outcome::Success(key) => Ok(Json(UploadResponse {
            bucket,
            key: key.key().to_string(),
        })
        .into_response()),
        other => Err(ApiError::from_outcome(other, ErrorCode::NoSuchBucket)),
    }
}

/// GET /buckets/{bucket}/objects?folder={folder} - List objects with share links
pub async fn list_objects(
    State(state): State<Arc<AppState>>,
    Extension(cancel): Extension<CancellationToken>,
    Path(bucket): Path<String>,
    Query(params): Query<FolderParams>,
) -> Result<Response, ApiError> {
    let outcome = state
        .gateway
        .list_with_share_links(&bucket, params.folder.as_deref(), &cancel)
        .await?;

    match outcome {
        Outcome::Success(listing) => {
            Ok(Json(ListingResponse::new(bucket, params.folder, listing, Vec::new())).into_response())
        }
        Outcome::PartialFailure { successes, failures } => Ok((
            StatusCode::MULTI_STATUS,
            Json(ListingResponse::new(bucket, params.folder, successes, failures)),
        )
            .into_response()),
        other => Err(ApiError::from_outcome(other, ErrorCode::NoSuchBucket)),
    }
}

/// DELETE /buckets/{bucket}/objects/{*key} - Delete an object
pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    Extension(cancel): Extension<CancellationToken>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    match state.gateway.delete_object(&bucket, &key, &cancel).await? {
        Outcome::Success(()) => Ok(Json(DeleteResponse {
            bucket,
            key,
            status: "deleted",
        })
        .into_response()),
        Outcome::TransientError(e) | Outcome::Fatal(e) => {
            Err(ApiError::backend(ErrorCode::DeleteFailed, &e, format!("{}/{}", bucket, key)))
        }
        other => Err(ApiError::from_outcome(other, ErrorCode::NoSuchBucket)),
    }
}

/// GET /buckets/{bucket}/download/{*key} - Stream an object
pub async fn download_object(
    State(state): State<Arc<AppState>>,
    Extension(cancel): Extension<CancellationToken>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    match state.gateway.download_object(&bucket, &key, &cancel).await? {
        Outcome::Success(download) => stream_response(download, &key),
        other => Err(ApiError::from_outcome(other, ErrorCode::NoSuchKey)),
    }
}

/// GET /share/{bucket}/{*key}?expires=..&signature=.. - Serve a memory-mode share link
pub async fn shared_object(
    State(state): State<Arc<AppState>>,
    Extension(cancel): Extension<CancellationToken>,
    Path((bucket, key)): Path<(String, String)>,
    Query(params): Query<ShareParams>,
) -> Result<Response, ApiError> {
    let memory = state.memory.as_ref().ok_or_else(|| {
        ApiError::new(
            ErrorCode::InvalidRequest,
            "Share links are served by the storage backend",
        )
    })?;

    let now = Utc::now();
    if now.timestamp() > params.expires {
        return Err(ApiError::with_resource(ErrorCode::LinkExpired, "The share link has expired", key));
    }
    if !memory.verify_share_link(&bucket, &key, params.expires, &params.signature, now) {
        return Err(ApiError::with_resource(
            ErrorCode::InvalidSignature,
            "The share link signature does not match",
            key,
        ));
    }

    match state.gateway.download_object(&bucket, &key, &cancel).await? {
        Outcome::Success(download) => stream_response(download, &key),
        other => Err(ApiError::from_outcome(other, ErrorCode::NoSuchKey)),
    }
}

fn stream_response(download: ObjectDownload, key: &str) -> Result<Response, ApiError> {
    let content_type = download
        .content_type
        .unwrap_or_else(|| mime_guess::from_path(key).first_or_octet_stream().to_string());

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(length) = download.content_length {
        response = response.header(header::CONTENT_LENGTH, length);
    }

    response
        .body(Body::from_stream(download.body))
        .map_err(|e| ApiError::Internal(format!("failed to build response: {}", e)))
}

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::new(ErrorCode::InvalidRequest, format!("Malformed multipart body: {}", e))
}

/// Last path component of a client-supplied filename
fn base_name(filename: &str) -> String {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim()
        .to_string()
}
