//! Bucket and object types shared by every backend

use crate::error::{BackendError, NameError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum object key length in bytes
pub const MAX_KEY_LEN: usize = 1024;

/// Streamed object body
pub type ByteStream = BoxStream<'static, std::result::Result<Bytes, BackendError>>;

/// A validated bucket name
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketRef {
    name: String,
}

impl BucketRef {
    /// Validate and wrap a bucket name
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        validate_bucket_name(&name)?;
        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for BucketRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A validated key inside a bucket
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    bucket: BucketRef,
    key: String,
}

impl ObjectKey {
    /// Validate and wrap an object key
    pub fn new(bucket: BucketRef, key: impl Into<String>) -> Result<Self, NameError> {
        let key = key.into();
        validate_object_key(&key)?;
        Ok(Self { bucket, key })
    }

    /// Build a key from an optional folder prefix and a filename.
    ///
    /// `("reports", "q1.pdf")` becomes `reports/q1.pdf`; a missing or blank
    /// folder leaves the filename as is.
    pub fn join(bucket: BucketRef, folder: Option<&str>, filename: &str) -> Result<Self, NameError> {
        let folder = folder.map(|f| f.trim().trim_matches('/')).unwrap_or("");
        if folder.is_empty() {
            Self::new(bucket, filename)
        } else {
            Self::new(bucket, format!("{}/{}", folder, filename))
        }
    }

    pub fn bucket(&self) -> &BucketRef {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// A bucket as reported by the backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// One entry of an object listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// A single page of an object listing
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Entries in key order
    pub items: Vec<ObjectSummary>,
    /// Token for the next page; `None` on the last page
    pub continuation_token: Option<String>,
}

/// A time-limited URL granting direct read access to one object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    pub key: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// A body to store
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub key: ObjectKey,
    pub content_type: String,
    /// Reference-counted, so a retry replays it without copying
    pub body: Bytes,
    pub size_hint: Option<u64>,
}

impl UploadRequest {
    pub fn new(key: ObjectKey, content_type: impl Into<String>, body: Bytes) -> Self {
        let size_hint = Some(body.len() as u64);
        Self {
            key,
            content_type: content_type.into(),
            body,
            size_hint,
        }
    }
}

/// A downloaded object
pub struct ObjectDownload {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl fmt::Debug for ObjectDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectDownload")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

fn validate_bucket_name(name: &str) -> Result<(), NameError> {
    if name.len() < 3 || name.len() > 63 {
        return Err(NameError::InvalidBucketName(
            "Bucket name must be between 3 and 63 characters".to_string(),
        ));
    }

    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.') {
        return Err(NameError::InvalidBucketName(
            "Bucket name can only contain lowercase letters, numbers, hyphens, and periods".to_string(),
        ));
    }

    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
        return Err(NameError::InvalidBucketName(
            "Bucket name must start and end with a letter or number".to_string(),
        ));
    }

    if name.contains("..") {
        return Err(NameError::InvalidBucketName(
            "Bucket name cannot contain adjacent periods".to_string(),
        ));
    }

    if name.parse::<std::net::Ipv4Addr>().is_ok() {
        return Err(NameError::InvalidBucketName(
            "Bucket name cannot be formatted as an IP address".to_string(),
        ));
    }

    Ok(())
}

fn validate_object_key(key: &str) -> Result<(), NameError> {
    if key.is_empty() {
        return Err(NameError::InvalidObjectKey("Key cannot be empty".to_string()));
    }

    if key.len() > MAX_KEY_LEN {
        return Err(NameError::InvalidObjectKey(format!(
            "Key cannot exceed {} bytes",
            MAX_KEY_LEN
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(name: &str) -> BucketRef {
        BucketRef::new(name).unwrap()
    }

    #[test]
    fn test_bucket_name_validation() {
        assert!(BucketRef::new("my-bucket").is_ok());
        assert!(BucketRef::new("my.bucket.name").is_ok());
        assert!(BucketRef::new("bucket123").is_ok());

        assert!(BucketRef::new("").is_err());
        assert!(BucketRef::new("ab").is_err()); // Too short
        assert!(BucketRef::new("-bucket").is_err()); // Starts with hyphen
        assert!(BucketRef::new("bucket.").is_err()); // Ends with period
        assert!(BucketRef::new("Bucket").is_err()); // Uppercase
        assert!(BucketRef::new("my..bucket").is_err());
        assert!(BucketRef::new("192.168.1.1").is_err());
    }

    #[test]
    fn test_key_join_with_folder() {
        let key = ObjectKey::join(bucket("docs"), Some("reports"), "q1.pdf").unwrap();
        assert_eq!(key.key(), "reports/q1.pdf");
        assert_eq!(key.to_string(), "docs/reports/q1.pdf");
    }

    #[test]
    fn test_key_join_without_folder() {
        let key = ObjectKey::join(bucket("docs"), None, "q1.pdf").unwrap();
        assert_eq!(key.key(), "q1.pdf");

        let key = ObjectKey::join(bucket("docs"), Some("  "), "q1.pdf").unwrap();
        assert_eq!(key.key(), "q1.pdf");
    }

    #[test]
    fn test_key_join_trims_slashes() {
        let key = ObjectKey::join(bucket("docs"), Some("/a/b/"), "c.txt").unwrap();
        assert_eq!(key.key(), "a/b/c.txt");
    }

    #[test]
    fn test_key_validation() {
        assert!(ObjectKey::new(bucket("docs"), "").is_err());
        assert!(ObjectKey::new(bucket("docs"), "x".repeat(MAX_KEY_LEN + 1)).is_err());
        assert!(ObjectKey::new(bucket("docs"), "x".repeat(MAX_KEY_LEN)).is_ok());
    }
}
