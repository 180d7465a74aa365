//! # Bucketgate Core
//!
//! Resilience layer between the HTTP surface and an object-storage backend.
//!
//! This crate provides:
//! - **Retry Policy**: exponential backoff with jitter that never replays a
//!   non-idempotent request that may already have been applied
//! - **Bounded Executor**: semaphore-limited fan-out with per-item failure reports
//! - **Paginator**: lazy listing streams driven by continuation tokens
//! - **Gateway**: the bucket and object operations, returning explicit [`Outcome`]s
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP handlers              │
//! ├─────────────────────────────────────────┤
//! │                Gateway                  │
//! ├──────────────┬──────────────────────────┤
//! │  Paginator   │    BoundedExecutor       │
//! ├──────────────┴──────────────────────────┤
//! │              RetryPolicy                │
//! ├─────────────────────────────────────────┤
//! │         Arc<dyn StorageBackend>         │
//! └─────────────────────────────────────────┘
//! ```

pub mod error;
pub mod executor;
pub mod gateway;
pub mod outcome;
pub mod paginator;
pub mod retry;

pub use error::{GatewayError, Result, RetryError};
pub use executor::{BatchFailure, BatchReport, BoundedExecutor, TaskError};
pub use gateway::{Gateway, GatewayOptions};
pub use outcome::{ItemFailure, Outcome, ShareListing};
pub use paginator::Paginator;
pub use retry::{RetryConfig, RetryDecision, RetryPolicy};

pub use tokio_util::sync::CancellationToken;
