//! Lazy object listing across continuation tokens

use crate::error::RetryError;
use crate::retry::RetryPolicy;
use bucketgate_backend::{BucketRef, ListingPage, ObjectSummary, StorageBackend, DEFAULT_PAGE_SIZE};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Walks a listing page by page, retrying each page call
#[derive(Clone)]
pub struct Paginator {
    backend: Arc<dyn StorageBackend>,
    retry: RetryPolicy,
    page_size: usize,
}

impl Paginator {
    pub fn new(backend: Arc<dyn StorageBackend>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            retry,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Stream whole pages.
    ///
    /// The stream ends after the first page without a continuation token.
    /// A failed page is the last item; nothing follows it.
    pub fn pages(
        &self,
        bucket: BucketRef,
        prefix: Option<String>,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<ListingPage, RetryError>> {
        let backend = self.backend.clone();
        let retry = self.retry.clone();
        let page_size = self.page_size;

        stream::try_unfold(Cursor::Start, move |cursor| {
            let backend = backend.clone();
            let retry = retry.clone();
            let bucket = bucket.clone();
            let prefix = prefix.clone();
            let cancel = cancel.clone();

            async move {
                let token = match cursor {
                    Cursor::Done => return Ok(None),
                    Cursor::Start => None,
                    Cursor::Next(token) => Some(token),
                };
                if cancel.is_cancelled() {
                    return Err(RetryError::Cancelled);
                }

                let page = retry
                    .execute("list_objects", true, &cancel, || {
                        backend.list_objects(&bucket, prefix.as_deref(), token.as_deref(), page_size)
                    })
                    .await?;

                debug!(
                    bucket = %bucket,
                    items = page.items.len(),
                    has_more = page.continuation_token.is_some(),
                    "Listed page"
                );

                let next = match &page.continuation_token {
                    Some(token) => Cursor::Next(token.clone()),
                    None => Cursor::Done,
                };
                Ok(Some((page, next)))
            }
        })
        .boxed()
    }

    /// Stream individual objects in listing order
    pub fn list(
        &self,
        bucket: BucketRef,
        prefix: Option<String>,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<ObjectSummary, RetryError>> {
        self.pages(bucket, prefix, cancel)
            .map_ok(|page| stream::iter(page.items.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }
}
