//! S3 REST API adapter

use crate::s3_xml;
use crate::sigv4::{self, Credentials, SigningContext};
use crate::{
    BackendError, BucketInfo, BucketRef, ErrorKind, ListingPage, ObjectDownload, ObjectKey, Result,
    ShareLink, StorageBackend, UploadRequest,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Method, Response, StatusCode, header};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Region that rejects an explicit `LocationConstraint`
const DEFAULT_REGION: &str = "us-east-1";

/// Longest expiry S3 accepts for a presigned URL (7 days)
const MAX_PRESIGN_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuration for an S3-compatible backend
#[derive(Clone, Debug)]
pub struct S3Config {
    /// Service endpoint (e.g., "https://s3.amazonaws.com" or "http://localhost:9000")
    pub endpoint: String,
    /// Signing region
    pub region: String,
    /// Address buckets as `/{bucket}` instead of `{bucket}.{host}`
    pub path_style: bool,
    /// Buckets keep object versions, so a replayed put is not at-most-once
    pub versioned_buckets: bool,
    /// Connect timeout, and the longest a response may stall between reads.
    /// Not a whole-request limit, so long downloads keep streaming.
    pub timeout: Duration,
    /// Access credentials; requests are sent unsigned when absent
    pub credentials: Option<Credentials>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: "https://s3.amazonaws.com".to_string(),
            region: DEFAULT_REGION.to_string(),
            path_style: false,
            versioned_buckets: false,
            timeout: Duration::from_secs(30),
            credentials: None,
        }
    }
}

impl S3Config {
    /// Create with a custom endpoint
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_path_style(mut self, path_style: bool) -> Self {
        self.path_style = path_style;
        self
    }
}

/// Where a request goes: scheme, host header value and encoded path
struct Target {
    scheme: String,
    host: String,
    path: String,
}

impl Target {
    fn url(&self, query: &str) -> String {
        if query.is_empty() {
            format!("{}://{}{}", self.scheme, self.host, self.path)
        } else {
            format!("{}://{}{}?{}", self.scheme, self.host, self.path, query)
        }
    }
}

/// S3 backend client.
///
/// Holds one pooled HTTP client; clone it or share it behind an `Arc`.
#[derive(Clone)]
pub struct S3Backend {
    client: Client,
    endpoint: Url,
    config: S3Config,
}

impl S3Backend {
    /// Create a new S3 backend
    pub fn new(config: S3Config) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            BackendError::unknown(format!("invalid endpoint {}: {}", config.endpoint, e))
        })?;
        if endpoint.host_str().is_none() {
            return Err(BackendError::unknown(format!(
                "endpoint has no host: {}",
                config.endpoint
            )));
        }

        let client = Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::unknown(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &S3Config {
        &self.config
    }

    fn target(&self, bucket: Option<&str>, key: Option<&str>) -> Target {
        let scheme = self.endpoint.scheme().to_string();
        let base_host = match (self.endpoint.host_str(), self.endpoint.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };
        let encoded_key = key.map(|k| sigv4::uri_encode(k, false));

        match bucket {
            Some(bucket) if !self.path_style_for(bucket, &scheme) => Target {
                scheme,
                host: format!("{}.{}", bucket, base_host),
                path: format!("/{}", encoded_key.unwrap_or_default()),
            },
            Some(bucket) => Target {
                scheme,
                host: base_host,
                path: match encoded_key {
                    Some(key) => format!("/{}/{}", bucket, key),
                    None => format!("/{}", bucket),
                },
            },
            None => Target {
                scheme,
                host: base_host,
                path: "/".to_string(),
            },
        }
    }

    /// Dotted bucket names break the wildcard certificate of a
    /// virtual-hosted endpoint, so they go path-style over https.
    fn path_style_for(&self, bucket: &str, scheme: &str) -> bool {
        self.config.path_style || (scheme == "https" && bucket.contains('.'))
    }

    /// Sign and send a request without interpreting the status
    async fn send(
        &self,
        method: Method,
        target: &Target,
        query: &[(String, String)],
        content_type: Option<&str>,
        body: Option<Bytes>,
    ) -> Result<Response> {
        let payload_hash = sigv4::sha256_hex(body.as_deref().unwrap_or_default());
        let canonical_query = sigv4::canonical_query(query);
        let url = target.url(&canonical_query);

        let mut request = self.client.request(method.clone(), &url);

        if let Some(credentials) = &self.config.credentials {
            let ctx = SigningContext::new(credentials, &self.config.region, Utc::now());
            let mut signed = vec![
                ("host".to_string(), target.host.clone()),
                ("x-amz-content-sha256".to_string(), payload_hash.clone()),
                ("x-amz-date".to_string(), ctx.amz_date()),
            ];
            if let Some(token) = &credentials.session_token {
                signed.push(("x-amz-security-token".to_string(), token.clone()));
            }
            if let Some(ct) = content_type {
                signed.push(("content-type".to_string(), ct.to_string()));
            }

            let authorization =
                ctx.authorization(method.as_str(), &target.path, query, &signed, &payload_hash);
            for (name, value) in signed.into_iter().filter(|(name, _)| name != "host") {
                request = request.header(name, value);
            }
            request = request.header(header::AUTHORIZATION, authorization);
        } else if let Some(ct) = content_type {
            request = request.header(header::CONTENT_TYPE, ct);
        }

        if let Some(body) = body {
            request = request.body(body);
        }

        debug!(method = %method, url = %url, "S3 request");
        Ok(request.send().await?)
    }

    /// Turn a non-success response into a classified error
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_response(status, &body))
    }
}

/// Classify an S3 error response by status and `<Code>`
pub fn classify_response(status: StatusCode, body: &str) -> BackendError {
    let (code, message) = s3_xml::parse_error(body)
        .unwrap_or_else(|| (format!("HTTP{}", status.as_u16()), status.to_string()));
    let detail = format!("{}: {}", code, message);

    match code.as_str() {
        "NoSuchBucket" | "NoSuchKey" => return BackendError::not_found(detail),
        "BucketAlreadyOwnedByYou" | "BucketAlreadyExists" | "BucketNotEmpty" => {
            return BackendError::conflict(detail);
        }
        "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" => {
            return BackendError::permission(detail);
        }
        "SlowDown" => return BackendError::server(detail).without_side_effect(),
        _ => {}
    }

    match status.as_u16() {
        404 => BackendError::not_found(detail),
        409 => BackendError::conflict(detail),
        401 | 403 => BackendError::permission(detail),
        408 | 429 => BackendError::transient(detail).without_side_effect(),
        503 => BackendError::server(detail).without_side_effect(),
        500..=599 => BackendError::server(detail),
        _ => BackendError::new(ErrorKind::Unknown, detail),
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn puts_are_idempotent(&self) -> bool {
        !self.config.versioned_buckets
    }

    #[instrument(skip(self))]
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let target = self.target(None, None);
        let response = Self::check(self.send(Method::GET, &target, &[], None, None).await?).await?;
        let text = response.text().await?;
        s3_xml::parse_list_buckets(&text)
    }

    #[instrument(skip(self), fields(bucket = %bucket))]
    async fn bucket_exists(&self, bucket: &BucketRef) -> Result<bool> {
        let target = self.target(Some(bucket.name()), None);
        let response = self.send(Method::HEAD, &target, &[], None, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check(response).await?;
        Ok(true)
    }

    #[instrument(skip(self), fields(bucket = %bucket))]
    async fn create_bucket(&self, bucket: &BucketRef) -> Result<()> {
        let target = self.target(Some(bucket.name()), None);
        let body = (self.config.region != DEFAULT_REGION)
            .then(|| Bytes::from(s3_xml::create_bucket_configuration(&self.config.region)));
        Self::check(self.send(Method::PUT, &target, &[], None, body).await?).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %bucket))]
    async fn delete_bucket(&self, bucket: &BucketRef) -> Result<()> {
        let target = self.target(Some(bucket.name()), None);
        Self::check(self.send(Method::DELETE, &target, &[], None, None).await?).await?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(key = %request.key, size = request.body.len()))]
    async fn put_object(&self, request: &UploadRequest) -> Result<()> {
        let target = self.target(Some(request.key.bucket().name()), Some(request.key.key()));
        let response = self
            .send(
                Method::PUT,
                &target,
                &[],
                Some(&request.content_type),
                Some(request.body.clone()),
            )
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get_object(&self, key: &ObjectKey) -> Result<ObjectDownload> {
        let target = self.target(Some(key.bucket().name()), Some(key.key()));
        let response = Self::check(self.send(Method::GET, &target, &[], None, None).await?).await?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map_err(BackendError::from)
            .boxed();

        Ok(ObjectDownload {
            content_type,
            content_length,
            body,
        })
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete_object(&self, key: &ObjectKey) -> Result<()> {
        let target = self.target(Some(key.bucket().name()), Some(key.key()));
        let response = self.send(Method::DELETE, &target, &[], None, None).await?;
        match Self::check(response).await {
            Ok(_) => Ok(()),
            // S3 answers 204 for absent keys; a 404 NoSuchKey from a
            // compatible store means the same thing.
            Err(e) if e.is_not_found() && e.message.starts_with("NoSuchKey") => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(bucket = %bucket))]
    async fn list_objects(
        &self,
        bucket: &BucketRef,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListingPage> {
        let mut query = vec![
            ("list-type".to_string(), "2".to_string()),
            ("max-keys".to_string(), max_keys.to_string()),
        ];
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            query.push(("prefix".to_string(), prefix.to_string()));
        }
        if let Some(token) = continuation_token {
            query.push(("continuation-token".to_string(), token.to_string()));
        }

        let target = self.target(Some(bucket.name()), None);
        let response = Self::check(self.send(Method::GET, &target, &query, None, None).await?).await?;
        let text = response.text().await?;
        s3_xml::parse_list_objects(&text)
    }

    async fn presign_get(&self, key: &ObjectKey, expires_in: Duration) -> Result<ShareLink> {
        let credentials = self
            .config
            .credentials
            .as_ref()
            .ok_or_else(|| BackendError::permission("presigning requires credentials"))?;

        let expires_secs = expires_in.as_secs().clamp(1, MAX_PRESIGN_SECS);
        let now = Utc::now();
        let target = self.target(Some(key.bucket().name()), Some(key.key()));
        let ctx = SigningContext::new(credentials, &self.config.region, now);
        let query = ctx.presign_query("GET", &target.host, &target.path, expires_secs);

        Ok(ShareLink {
            key: key.key().to_string(),
            url: target.url(&query),
            expires_at: now + chrono::Duration::seconds(expires_secs as i64),
        })
    }
}
