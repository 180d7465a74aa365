//! Error types for the bucketgate-core crate

use bucketgate_backend::{BackendError, ErrorKind, NameError};
use thiserror::Error;

/// Result type alias using `GatewayError`
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors raised before any backend call is made
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Bucket name or object key failed validation
    #[error(transparent)]
    InvalidName(#[from] NameError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Why the retry engine stopped without a result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// The error is not retryable and is surfaced unchanged
    #[error("{0}")]
    Terminal(BackendError),

    /// Retryable, but the request may have been applied and the operation is
    /// not idempotent
    #[error("not retried, request may have been applied: {0}")]
    Unsafe(BackendError),

    /// Every attempt failed
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: BackendError },

    /// The caller's cancellation token fired
    #[error("operation cancelled")]
    Cancelled,
}

impl RetryError {
    /// The classified backend error behind this failure, if any
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Self::Terminal(e) | Self::Unsafe(e) => Some(e),
            Self::Exhausted { last, .. } => Some(last),
            Self::Cancelled => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.backend_error().is_some_and(|e| e.is_not_found())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Terminal(e) if e.kind == ErrorKind::Conflict)
    }

    /// Collapse into a backend error, for per-item failure reports
    pub fn into_backend_error(self) -> BackendError {
        match self {
            Self::Terminal(e) | Self::Unsafe(e) => e,
            Self::Exhausted { last, .. } => last,
            Self::Cancelled => BackendError::unknown("operation cancelled").without_side_effect(),
        }
    }
}
