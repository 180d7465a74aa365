//! Error types and API error codes

use crate::middleware::current_request_id;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bucketgate_backend::{BackendError, ErrorKind, NameError};
use bucketgate_core::{GatewayError, Outcome};
use serde::Serialize;
use thiserror::Error;

/// API error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    AccessDenied,
    BackendUnavailable,
    BadGateway,
    BucketNotEmpty,
    Conflict,
    DeleteFailed,
    InternalError,
    InvalidBucketName,
    InvalidObjectKey,
    InvalidRequest,
    InvalidSignature,
    LinkExpired,
    NoSuchBucket,
    NoSuchKey,
    RequestTimeout,
    SlowDown,
}

impl ErrorCode {
    /// Get the error code string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::BackendUnavailable => "BackendUnavailable",
            Self::BadGateway => "BadGateway",
            Self::BucketNotEmpty => "BucketNotEmpty",
            Self::Conflict => "Conflict",
            Self::DeleteFailed => "DeleteFailed",
            Self::InternalError => "InternalError",
            Self::InvalidBucketName => "InvalidBucketName",
            Self::InvalidObjectKey => "InvalidObjectKey",
            Self::InvalidRequest => "InvalidRequest",
            Self::InvalidSignature => "InvalidSignature",
            Self::LinkExpired => "LinkExpired",
            Self::NoSuchBucket => "NoSuchBucket",
            Self::NoSuchKey => "NoSuchKey",
            Self::RequestTimeout => "RequestTimeout",
            Self::SlowDown => "SlowDown",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AccessDenied | Self::InvalidSignature | Self::LinkExpired => StatusCode::FORBIDDEN,
            Self::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadGateway => StatusCode::BAD_GATEWAY,
            Self::BucketNotEmpty | Self::Conflict => StatusCode::CONFLICT,
            Self::DeleteFailed
            | Self::InvalidBucketName
            | Self::InvalidObjectKey
            | Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoSuchBucket | Self::NoSuchKey => StatusCode::NOT_FOUND,
            Self::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::SlowDown => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Code for a classified backend failure
    pub fn for_backend(error: &BackendError) -> Self {
        match error.kind {
            ErrorKind::NotFound => Self::NoSuchKey,
            ErrorKind::Conflict if error.message.starts_with("BucketNotEmpty") => Self::BucketNotEmpty,
            ErrorKind::Conflict => Self::Conflict,
            ErrorKind::TransientNetwork => Self::BackendUnavailable,
            ErrorKind::ServerError => Self::BadGateway,
            ErrorKind::Permission => Self::AccessDenied,
            ErrorKind::Unknown => Self::InternalError,
        }
    }
}

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    Api {
        code: ErrorCode,
        message: String,
        resource: Option<String>,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
            resource: None,
        }
    }

    /// Create with resource
    pub fn with_resource(code: ErrorCode, message: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
            resource: Some(resource.into()),
        }
    }

    /// Map a backend failure, keeping its message
    pub fn backend(code: ErrorCode, error: &BackendError, resource: impl Into<String>) -> Self {
        Self::with_resource(code, error.to_string(), resource)
    }

    /// Map every non-success outcome onto an error.
    ///
    /// `not_found` is the code used for `Outcome::NotFound`, since only the
    /// caller knows whether the missing resource is a bucket or a key.
    pub fn from_outcome<T>(outcome: Outcome<T>, not_found: ErrorCode) -> Self {
        match outcome {
            Outcome::NotFound(resource) => {
                let message = match not_found {
                    ErrorCode::NoSuchBucket => "The specified bucket does not exist",
                    _ => "The specified key does not exist",
                };
                Self::with_resource(not_found, message, resource)
            }
            Outcome::AlreadyExists(resource) => {
                Self::with_resource(ErrorCode::Conflict, "Resource already exists", resource)
            }
            Outcome::TransientError(e) => Self::new(ErrorCode::BackendUnavailable, e.to_string()),
            Outcome::Fatal(e) => Self::new(ErrorCode::for_backend(&e), e.to_string()),
            Outcome::Cancelled => Self::new(ErrorCode::RequestTimeout, "Request cancelled before completion"),
            Outcome::Success(_) | Outcome::PartialFailure { .. } => {
                Self::Internal("successful outcome mapped as an error".to_string())
            }
        }
    }

    /// Get the error code
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Api { code, .. } => *code,
            Self::Internal(_) => ErrorCode::InternalError,
            Self::Gateway(GatewayError::InvalidName(NameError::InvalidBucketName(_))) => {
                ErrorCode::InvalidBucketName
            }
            Self::Gateway(GatewayError::InvalidName(NameError::InvalidObjectKey(_))) => {
                ErrorCode::InvalidObjectKey
            }
            Self::Gateway(GatewayError::InvalidConfig(_)) => ErrorCode::InternalError,
        }
    }

    fn resource(&self) -> Option<&str> {
        match self {
            Self::Api { resource, .. } => resource.as_deref(),
            _ => None,
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<&'a str>,
    pub request_id: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.status_code();
        let request_id = current_request_id();

        if status.is_server_error() {
            tracing::warn!(code = code.as_str(), request_id = %request_id, error = %self, "Request failed");
        }

        let body = ErrorBody {
            code: code.as_str(),
            message: self.to_string(),
            resource: self.resource(),
            request_id,
        };
        (status, Json(body)).into_response()
    }
}
