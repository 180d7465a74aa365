//! Gateway facade: the bucket and object operations exposed over HTTP

use crate::error::{Result, RetryError};
use crate::executor::{BoundedExecutor, TaskError, DEFAULT_MAX_CONCURRENCY};
use crate::outcome::{ItemFailure, Outcome, ShareListing};
use crate::paginator::Paginator;
use crate::retry::{RetryConfig, RetryPolicy};
use bucketgate_backend::{
    BackendError, BucketInfo, BucketRef, ObjectDownload, ObjectKey, ShareLink, StorageBackend,
    UploadRequest, DEFAULT_PAGE_SIZE,
};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default lifetime of a share link
pub const DEFAULT_SHARE_LINK_TTL: Duration = Duration::from_secs(60);

/// Tuning knobs for the facade
#[derive(Clone, Debug)]
pub struct GatewayOptions {
    pub share_link_ttl: Duration,
    pub max_concurrency: usize,
    pub page_size: usize,
    pub retry: RetryConfig,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            share_link_ttl: DEFAULT_SHARE_LINK_TTL,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryConfig::default(),
        }
    }
}

/// Bucket and object operations over a shared backend handle.
///
/// Every operation is independent; the gateway holds no per-request state.
#[derive(Clone)]
pub struct Gateway {
    backend: Arc<dyn StorageBackend>,
    retry: RetryPolicy,
    executor: BoundedExecutor,
    paginator: Paginator,
    options: GatewayOptions,
}

impl Gateway {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_options(backend, GatewayOptions::default())
    }

    pub fn with_options(backend: Arc<dyn StorageBackend>, options: GatewayOptions) -> Self {
        let retry = RetryPolicy::new(options.retry.clone());
        let paginator = Paginator::new(backend.clone(), retry.clone()).with_page_size(options.page_size);
        Self {
            executor: BoundedExecutor::new(options.max_concurrency),
            backend,
            retry,
            paginator,
            options,
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    /// List every bucket
    #[instrument(skip(self, cancel))]
    pub async fn list_buckets(&self, cancel: &CancellationToken) -> Outcome<Vec<BucketInfo>> {
        match self
            .retry
            .execute("list_buckets", true, cancel, || self.backend.list_buckets())
            .await
        {
            Ok(buckets) => Outcome::Success(buckets),
            Err(e) => Outcome::from_retry_error(e, "buckets"),
        }
    }

    /// Create a bucket; an existing bucket is `AlreadyExists`
    #[instrument(skip(self, cancel))]
    pub async fn create_bucket(&self, name: &str, cancel: &CancellationToken) -> Result<Outcome<()>> {
        let bucket = BucketRef::new(name)?;

        match self.exists(&bucket, cancel).await {
            Ok(true) => return Ok(Outcome::AlreadyExists(bucket.name().to_string())),
            Ok(false) => {}
            Err(e) => return Ok(Outcome::from_retry_error(e, bucket.name())),
        }

        let outcome = match self
            .retry
            .execute("create_bucket", true, cancel, || self.backend.create_bucket(&bucket))
            .await
        {
            Ok(()) => Outcome::Success(()),
            // Lost a race with a concurrent creator
            Err(e) if e.is_conflict() => Outcome::AlreadyExists(bucket.name().to_string()),
            Err(e) => Outcome::from_retry_error(e, bucket.name()),
        };
        info!(bucket = %bucket, outcome = outcome.label(), "Create bucket");
        Ok(outcome)
    }

    /// Delete a bucket; an absent bucket counts as deleted
    #[instrument(skip(self, cancel))]
    pub async fn delete_bucket(&self, name: &str, cancel: &CancellationToken) -> Result<Outcome<()>> {
        let bucket = BucketRef::new(name)?;

        let outcome = match self
            .retry
            .execute("delete_bucket", true, cancel, || self.backend.delete_bucket(&bucket))
            .await
        {
            Ok(()) => Outcome::Success(()),
            Err(e) if e.is_not_found() => Outcome::Success(()),
            Err(e) => Outcome::from_retry_error(e, bucket.name()),
        };
        info!(bucket = %bucket, outcome = outcome.label(), "Delete bucket");
        Ok(outcome)
    }

    /// Upload a body under `folder/filename` (or `filename` without folder)
    #[instrument(skip(self, body, cancel), fields(size = body.len()))]
    pub async fn upload_object(
        &self,
        bucket: &str,
        folder: Option<&str>,
        filename: &str,
        content_type: &str,
        body: Bytes,
        cancel: &CancellationToken,
    ) -> Result<Outcome<ObjectKey>> {
        let bucket = BucketRef::new(bucket)?;
        let key = ObjectKey::join(bucket.clone(), folder, filename)?;

        if let Err(outcome) = self.require_bucket(&bucket, cancel).await {
            return Ok(outcome);
        }

        let request = UploadRequest::new(key.clone(), content_type, body);
        let idempotent = self.backend.puts_are_idempotent();
        let outcome = match self
            .retry
            .execute("put_object", idempotent, cancel, || self.backend.put_object(&request))
            .await
        {
            Ok(()) => Outcome::Success(key),
            Err(e) => Outcome::from_retry_error(e, key.to_string()),
        };
        info!(bucket = %bucket, outcome = outcome.label(), "Upload object");
        Ok(outcome)
    }

    /// List objects under `prefix` with a share link for each.
    ///
    /// Links are presigned concurrently and returned in listing order.
    #[instrument(skip(self, cancel))]
    pub async fn list_with_share_links(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Outcome<ShareListing>> {
        let bucket = BucketRef::new(bucket)?;
        let prefix = prefix.map(str::trim).filter(|p| !p.is_empty()).map(str::to_string);

        if let Err(outcome) = self.require_bucket(&bucket, cancel).await {
            return Ok(outcome);
        }

        let resource = match &prefix {
            Some(prefix) => format!("{}/{}", bucket, prefix),
            None => bucket.to_string(),
        };
        let presign = self.presign_worker(cancel.clone());

        let mut pages = self.paginator.pages(bucket.clone(), prefix, cancel.clone());
        let mut links = Vec::new();
        let mut failures = Vec::new();
        let mut seen = 0usize;

        while let Some(page) = pages.next().await {
            let page = match page {
                Ok(page) => page,
                Err(RetryError::Cancelled) => return Ok(Outcome::Cancelled),
                Err(e) if seen == 0 => return Ok(Outcome::from_retry_error(e, resource)),
                Err(e) => {
                    warn!(bucket = %bucket, listed = seen, error = %e, "Listing failed mid-pagination");
                    failures.push(ItemFailure {
                        key: resource.clone(),
                        error: e.into_backend_error(),
                    });
                    break;
                }
            };

            seen += page.items.len();
            let keys = page
                .items
                .into_iter()
                .filter_map(|item| ObjectKey::new(bucket.clone(), item.key).ok())
                .collect::<Vec<_>>();

            let report = self
                .executor
                .map_concurrent(keys, presign.clone(), cancel)
                .await;
            if !report.skipped.is_empty() {
                return Ok(Outcome::Cancelled);
            }

            links.extend(report.successes);
            failures.extend(report.failures.into_iter().map(|f| ItemFailure {
                key: f.item.key().to_string(),
                error: match f.error {
                    TaskError::Failed(e) => e.into_backend_error(),
                    TaskError::Panicked(msg) => BackendError::unknown(format!("presign panicked: {}", msg)),
                    TaskError::Aborted(msg) => BackendError::unknown(format!("presign aborted: {}", msg)),
                },
            }));
        }

        debug!(bucket = %bucket, links = links.len(), failures = failures.len(), "Share listing");

        let listing = ShareListing::from_listing(seen, links);
        if failures.is_empty() {
            Ok(Outcome::Success(listing))
        } else {
            Ok(Outcome::PartialFailure {
                successes: listing,
                failures,
            })
        }
    }

    /// Delete an object; an absent object counts as deleted
    #[instrument(skip(self, cancel))]
    pub async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome<()>> {
        let bucket = BucketRef::new(bucket)?;
        let key = ObjectKey::new(bucket.clone(), key)?;

        if let Err(outcome) = self.require_bucket(&bucket, cancel).await {
            return Ok(outcome);
        }

        let outcome = match self
            .retry
            .execute("delete_object", true, cancel, || self.backend.delete_object(&key))
            .await
        {
            Ok(()) => Outcome::Success(()),
            Err(e) if e.is_not_found() => Outcome::Success(()),
            Err(e) => Outcome::from_retry_error(e, key.to_string()),
        };
        info!(key = %key, outcome = outcome.label(), "Delete object");
        Ok(outcome)
    }

    /// Open an object for streaming. Single attempt, never retried.
    #[instrument(skip(self, cancel))]
    pub async fn download_object(
        &self,
        bucket: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome<ObjectDownload>> {
        let bucket = BucketRef::new(bucket)?;
        let key = ObjectKey::new(bucket, key)?;

        let result = tokio::select! {
            _ = cancel.cancelled() => return Ok(Outcome::Cancelled),
            result = self.backend.get_object(&key) => result,
        };

        Ok(match result {
            Ok(download) => Outcome::Success(download),
            Err(e) if e.is_not_found() => Outcome::NotFound(key.to_string()),
            Err(e) if e.is_retryable() => Outcome::TransientError(e),
            Err(e) => Outcome::Fatal(e),
        })
    }

    async fn exists(&self, bucket: &BucketRef, cancel: &CancellationToken) -> std::result::Result<bool, RetryError> {
        self.retry
            .execute("bucket_exists", true, cancel, || self.backend.bucket_exists(bucket))
            .await
    }

    /// `Err` carries the outcome to return when the bucket is missing or
    /// the check itself failed
    async fn require_bucket<T>(
        &self,
        bucket: &BucketRef,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), Outcome<T>> {
        match self.exists(bucket, cancel).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Outcome::NotFound(bucket.name().to_string())),
            Err(e) => Err(Outcome::from_retry_error(e, bucket.name())),
        }
    }

    fn presign_worker(
        &self,
        cancel: CancellationToken,
    ) -> impl Fn(ObjectKey) -> BoxFuture<'static, std::result::Result<ShareLink, RetryError>>
           + Clone
           + Send
           + Sync
           + 'static {
        let backend = self.backend.clone();
        let retry = self.retry.clone();
        let ttl = self.options.share_link_ttl;

        move |key: ObjectKey| {
            let backend = backend.clone();
            let retry = retry.clone();
            let cancel = cancel.clone();
            async move {
                retry
                    .execute("presign_get", true, &cancel, || backend.presign_get(&key, ttl))
                    .await
            }
            .boxed()
        }
    }
}
