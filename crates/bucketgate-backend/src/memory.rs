//! In-memory storage backend for development and testing

use crate::{
    BackendError, BucketInfo, BucketRef, ListingPage, ObjectDownload, ObjectKey, ObjectSummary,
    Result, ShareLink, StorageBackend, UploadRequest, DEFAULT_PAGE_SIZE,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::StreamExt;
use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Backend primitives, used to script faults and count calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    ListBuckets,
    BucketExists,
    CreateBucket,
    DeleteBucket,
    PutObject,
    GetObject,
    DeleteObject,
    ListObjects,
    PresignGet,
}

/// Configuration for the memory backend
#[derive(Clone, Debug)]
pub struct MemoryConfig {
    /// Maximum keys returned per listing page
    pub page_size: usize,
    /// Base URL embedded in share links
    pub base_url: String,
    /// Upper bound of a random delay added to every call
    pub latency: Option<Duration>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            base_url: "http://localhost:9000".to_string(),
            latency: None,
        }
    }
}

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

struct MemoryBucket {
    created_at: DateTime<Utc>,
    objects: BTreeMap<String, StoredObject>,
}

/// An in-memory object store.
///
/// Clones share the same buckets, so a handle can be kept by a test while
/// the gateway owns another.
#[derive(Clone)]
pub struct MemoryBackend {
    config: MemoryConfig,
    buckets: Arc<DashMap<String, MemoryBucket>>,
    scripted: Arc<DashMap<BackendOp, VecDeque<Option<BackendError>>>>,
    key_faults: Arc<DashMap<String, BackendError>>,
    calls: Arc<DashMap<BackendOp, usize>>,
    link_secret: [u8; 32],
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty memory backend
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    /// Create with a custom configuration
    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(DashMap::new()),
            scripted: Arc::new(DashMap::new()),
            key_faults: Arc::new(DashMap::new()),
            calls: Arc::new(DashMap::new()),
            link_secret: rand::random(),
        }
    }

    /// Queue an error returned by the next call of `op`
    pub fn fail_next(&self, op: BackendOp, error: BackendError) {
        self.scripted.entry(op).or_default().push_back(Some(error));
    }

    /// Let the next call of `op` through, ahead of faults queued after it
    pub fn pass_next(&self, op: BackendOp) {
        self.scripted.entry(op).or_default().push_back(None);
    }

    /// Fail every object-level call touching `key` until cleared
    pub fn fail_key(&self, key: impl Into<String>, error: BackendError) {
        self.key_faults.insert(key.into(), error);
    }

    /// Remove all scripted and per-key faults
    pub fn clear_faults(&self) {
        self.scripted.clear();
        self.key_faults.clear();
    }

    /// Number of calls made to `op`, including failed ones
    pub fn call_count(&self, op: BackendOp) -> usize {
        self.calls.get(&op).map(|c| *c).unwrap_or(0)
    }

    /// Number of objects stored in a bucket
    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets.get(bucket).map(|b| b.objects.len()).unwrap_or(0)
    }

    /// Check a share link signature produced by this backend
    pub fn verify_share_link(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if now.timestamp() > expires {
            return false;
        }
        self.sign(bucket, key, expires) == signature
    }

    fn sign(&self, bucket: &str, key: &str, expires: i64) -> String {
        let message = format!("{}/{}\n{}", bucket, key, expires);
        blake3::keyed_hash(&self.link_secret, message.as_bytes())
            .to_hex()
            .to_string()
    }

    /// Simulated latency, call accounting and scripted faults
    async fn enter(&self, op: BackendOp, key: Option<&str>) -> Result<()> {
        if let Some(max) = self.config.latency {
            let millis = max.as_millis() as u64;
            if millis > 0 {
                let delay = rand::random::<u64>() % (millis + 1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        *self.calls.entry(op).or_insert(0) += 1;

        if let Some(Some(err)) = self.scripted.get_mut(&op).and_then(|mut q| q.pop_front()) {
            return Err(err);
        }
        if let Some(key) = key {
            if let Some(err) = self.key_faults.get(key) {
                return Err(err.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn puts_are_idempotent(&self) -> bool {
        true
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.enter(BackendOp::ListBuckets, None).await?;
        let mut buckets: Vec<_> = self
            .buckets
            .iter()
            .map(|entry| BucketInfo {
                name: entry.key().clone(),
                created_at: Some(entry.value().created_at),
            })
            .collect();
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn bucket_exists(&self, bucket: &BucketRef) -> Result<bool> {
        self.enter(BackendOp::BucketExists, None).await?;
        Ok(self.buckets.contains_key(bucket.name()))
    }

    #[instrument(skip(self), fields(bucket = %bucket))]
    async fn create_bucket(&self, bucket: &BucketRef) -> Result<()> {
        self.enter(BackendOp::CreateBucket, None).await?;
        match self.buckets.entry(bucket.name().to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BackendError::conflict(format!(
                "BucketAlreadyOwnedByYou: {}",
                bucket
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(MemoryBucket {
                    created_at: Utc::now(),
                    objects: BTreeMap::new(),
                });
                Ok(())
            }
        }
    }

    #[instrument(skip(self), fields(bucket = %bucket))]
    async fn delete_bucket(&self, bucket: &BucketRef) -> Result<()> {
        self.enter(BackendOp::DeleteBucket, None).await?;
        let removed = self
            .buckets
            .remove_if(bucket.name(), |_, b| b.objects.is_empty());
        if removed.is_some() {
            return Ok(());
        }
        if self.buckets.contains_key(bucket.name()) {
            Err(BackendError::conflict(format!("BucketNotEmpty: {}", bucket)))
        } else {
            Err(BackendError::not_found(format!("NoSuchBucket: {}", bucket)))
        }
    }

    #[instrument(skip(self, request), fields(key = %request.key, size = request.body.len()))]
    async fn put_object(&self, request: &UploadRequest) -> Result<()> {
        self.enter(BackendOp::PutObject, Some(request.key.key())).await?;
        let mut bucket = self
            .buckets
            .get_mut(request.key.bucket().name())
            .ok_or_else(|| BackendError::not_found(format!("NoSuchBucket: {}", request.key.bucket())))?;
        bucket.objects.insert(
            request.key.key().to_string(),
            StoredObject {
                data: request.body.clone(),
                content_type: request.content_type.clone(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get_object(&self, key: &ObjectKey) -> Result<ObjectDownload> {
        self.enter(BackendOp::GetObject, Some(key.key())).await?;
        let stored = {
            let bucket = self
                .buckets
                .get(key.bucket().name())
                .ok_or_else(|| BackendError::not_found(format!("NoSuchBucket: {}", key.bucket())))?;
            bucket
                .objects
                .get(key.key())
                .cloned()
                .ok_or_else(|| BackendError::not_found(format!("NoSuchKey: {}", key)))?
        };

        let content_length = stored.data.len() as u64;
        let data = stored.data;
        Ok(ObjectDownload {
            content_type: Some(stored.content_type),
            content_length: Some(content_length),
            body: futures::stream::once(async move { Ok(data) }).boxed(),
        })
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete_object(&self, key: &ObjectKey) -> Result<()> {
        self.enter(BackendOp::DeleteObject, Some(key.key())).await?;
        let mut bucket = self
            .buckets
            .get_mut(key.bucket().name())
            .ok_or_else(|| BackendError::not_found(format!("NoSuchBucket: {}", key.bucket())))?;
        bucket.objects.remove(key.key());
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &BucketRef,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListingPage> {
        self.enter(BackendOp::ListObjects, None).await?;
        let entry = self
            .buckets
            .get(bucket.name())
            .ok_or_else(|| BackendError::not_found(format!("NoSuchBucket: {}", bucket)))?;

        let prefix = prefix.unwrap_or("");
        let limit = max_keys.min(self.config.page_size).max(1);
        let start = match continuation_token {
            Some(token) => Bound::Excluded(token),
            None => Bound::Included(prefix),
        };

        let mut items: Vec<ObjectSummary> = entry
            .objects
            .range::<str, _>((start, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(limit + 1)
            .map(|(key, obj)| ObjectSummary {
                key: key.clone(),
                size: obj.data.len() as u64,
                last_modified: obj.last_modified,
            })
            .collect();

        let continuation_token = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListingPage {
            items,
            continuation_token,
        })
    }

    async fn presign_get(&self, key: &ObjectKey, expires_in: Duration) -> Result<ShareLink> {
        self.enter(BackendOp::PresignGet, Some(key.key())).await?;
        let ttl = chrono::Duration::from_std(expires_in)
            .map_err(|e| BackendError::unknown(format!("invalid expiry: {}", e)))?;
        let expires_at = Utc::now() + ttl;
        let expires = expires_at.timestamp();
        let encoded_key = key
            .key()
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        Ok(ShareLink {
            key: key.key().to_string(),
            url: format!(
                "{}/{}/{}?expires={}&signature={}",
                self.config.base_url.trim_end_matches('/'),
                key.bucket(),
                encoded_key,
                expires,
                self.sign(key.bucket().name(), key.key(), expires)
            ),
            expires_at,
        })
    }
}
