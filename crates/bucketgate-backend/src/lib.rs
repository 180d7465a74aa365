//! # Bucketgate Backend
//!
//! Object-storage adapters for the bucketgate gateway.
//!
//! This crate provides:
//! - **StorageBackend trait**: one method per backend primitive, no retries
//! - **Error classification**: every failure carries an [`ErrorKind`] and a
//!   [`SideEffect`] marker that the retry engine relies on
//! - **S3 adapter**: S3 REST API over HTTP with SigV4 signing and presigning
//! - **Memory adapter**: in-process buckets for development and tests
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            bucketgate-core              │
//! ├─────────────────────────────────────────┤
//! │          StorageBackend Trait           │
//! ├────────────────────┬────────────────────┤
//! │     S3Backend      │   MemoryBackend    │
//! ├────────────────────┴────────────────────┤
//! │     S3-compatible object storage        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use bucketgate_backend::{BucketRef, MemoryBackend, StorageBackend};
//!
//! let backend = MemoryBackend::new();
//! let bucket = BucketRef::new("docs")?;
//! backend.create_bucket(&bucket).await?;
//! let page = backend.list_objects(&bucket, None, None, 1000).await?;
//! ```

pub mod error;
pub mod memory;
pub mod s3;
pub mod s3_xml;
pub mod sigv4;
pub mod types;

pub use error::{BackendError, ErrorKind, NameError, Result, SideEffect};
pub use memory::{BackendOp, MemoryBackend, MemoryConfig};
pub use s3::{S3Backend, S3Config};
pub use sigv4::Credentials;
pub use types::{
    BucketInfo, BucketRef, ByteStream, ListingPage, ObjectDownload, ObjectKey, ObjectSummary,
    ShareLink, UploadRequest,
};

use async_trait::async_trait;
use std::time::Duration;

/// Default number of keys requested per listing page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Trait for object-storage backends.
///
/// Implementations classify every failure and never retry internally.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Whether a replayed put of the same key has at most one visible effect
    fn puts_are_idempotent(&self) -> bool;

    /// List all buckets visible to the configured credentials
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    /// Check if a bucket exists
    async fn bucket_exists(&self, bucket: &BucketRef) -> Result<bool>;

    /// Create a bucket
    async fn create_bucket(&self, bucket: &BucketRef) -> Result<()>;

    /// Delete an empty bucket
    async fn delete_bucket(&self, bucket: &BucketRef) -> Result<()>;

    /// Store an object, replacing any previous body under the same key
    async fn put_object(&self, request: &UploadRequest) -> Result<()>;

    /// Open an object for streaming
    async fn get_object(&self, key: &ObjectKey) -> Result<ObjectDownload>;

    /// Delete an object. Deleting an absent key succeeds.
    async fn delete_object(&self, key: &ObjectKey) -> Result<()>;

    /// Fetch one page of keys under `prefix`, resuming after `continuation_token`
    async fn list_objects(
        &self,
        bucket: &BucketRef,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListingPage>;

    /// Generate a time-limited download URL
    async fn presign_get(&self, key: &ObjectKey, expires_in: Duration) -> Result<ShareLink>;
}
