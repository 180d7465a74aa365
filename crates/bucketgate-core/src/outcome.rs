//! Explicit operation results

use crate::error::RetryError;
use bucketgate_backend::{BackendError, ShareLink};
use serde::Serialize;

/// A batch item that failed, identified by key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub key: String,
    pub error: BackendError,
}

/// Result of a gateway operation
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    /// The named bucket or object does not exist
    NotFound(String),
    /// The named bucket already exists
    AlreadyExists(String),
    /// Some items succeeded and some failed
    PartialFailure {
        successes: T,
        failures: Vec<ItemFailure>,
    },
    /// A retryable failure that was not retried because the request may
    /// already have been applied
    TransientError(BackendError),
    /// Non-retryable failure, or retries exhausted
    Fatal(BackendError),
    /// The caller's cancellation token fired first
    Cancelled,
}

impl<T> Outcome<T> {
    /// Map a retry-engine failure onto an outcome for `resource`
    pub fn from_retry_error(err: RetryError, resource: impl Into<String>) -> Self {
        match err {
            e if e.is_not_found() => Self::NotFound(resource.into()),
            RetryError::Terminal(e) => Self::Fatal(e),
            RetryError::Unsafe(e) => Self::TransientError(e),
            RetryError::Exhausted { last, .. } => Self::Fatal(last),
            RetryError::Cancelled => Self::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short name for logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::PartialFailure { .. } => "partial_failure",
            Self::TransientError(_) => "transient_error",
            Self::Fatal(_) => "fatal",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(v) => Outcome::Success(f(v)),
            Self::NotFound(r) => Outcome::NotFound(r),
            Self::AlreadyExists(r) => Outcome::AlreadyExists(r),
            Self::PartialFailure {
                successes,
                failures,
            } => Outcome::PartialFailure {
                successes: f(successes),
                failures,
            },
            Self::TransientError(e) => Outcome::TransientError(e),
            Self::Fatal(e) => Outcome::Fatal(e),
            Self::Cancelled => Outcome::Cancelled,
        }
    }
}

/// Share links for a listing, with an explicit empty case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ShareListing {
    Empty,
    Links(Vec<ShareLink>),
}

impl ShareListing {
    /// `Empty` only when nothing was listed; a listing whose links all
    /// failed is `Links` with no entries.
    pub fn from_listing(listed: usize, links: Vec<ShareLink>) -> Self {
        if listed == 0 {
            Self::Empty
        } else {
            Self::Links(links)
        }
    }

    pub fn links(&self) -> &[ShareLink] {
        match self {
            Self::Empty => &[],
            Self::Links(links) => links,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}
