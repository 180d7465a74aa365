//! Error types for the bucketgate-backend crate

use std::fmt;
use thiserror::Error;

/// Result type alias using `BackendError`
pub type Result<T> = std::result::Result<T, BackendError>;

/// Classification of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bucket or object does not exist
    NotFound,
    /// Backend-side race or state conflict (bucket exists, bucket not empty)
    Conflict,
    /// Network-level failure; the request may be reissued
    TransientNetwork,
    /// 5xx-equivalent failure reported by the backend
    ServerError,
    /// Credentials rejected or access denied
    Permission,
    /// Anything the adapter could not classify
    Unknown,
}

impl ErrorKind {
    /// Whether a retry may help
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork | Self::ServerError)
    }

    /// Stable lowercase name, used in logs and API bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::TransientNetwork => "transient_network",
            Self::ServerError => "server_error",
            Self::Permission => "permission",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the backend may have applied a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// The request was rejected before the backend acted on it
    None,
    /// The backend may have acted on the request
    Possible,
}

/// A classified backend failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct BackendError {
    /// Failure classification
    pub kind: ErrorKind,
    /// Human-readable detail
    pub message: String,
    /// Whether the request may have been applied
    pub side_effect: SideEffect,
}

impl BackendError {
    /// Create an error whose side effects are unknown
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            side_effect: SideEffect::Possible,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message).without_side_effect()
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message).without_side_effect()
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, message).without_side_effect()
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientNetwork, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerError, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Mark the failure as rejected before anything was applied
    pub fn without_side_effect(mut self) -> Self {
        self.side_effect = SideEffect::None;
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            // Never reached the backend.
            BackendError::transient(format!("connection failed: {}", err)).without_side_effect()
        } else if err.is_timeout() {
            BackendError::transient(format!("request timed out: {}", err))
        } else if err.is_body() || err.is_request() {
            BackendError::transient(err.to_string())
        } else {
            BackendError::unknown(err.to_string())
        }
    }
}

/// Invalid bucket name or object key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("invalid object key: {0}")]
    InvalidObjectKey(String),
}
