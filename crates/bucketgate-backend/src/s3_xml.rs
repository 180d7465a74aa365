//! S3 XML response bodies

use crate::{BackendError, BucketInfo, ListingPage, ObjectSummary, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ListAllMyBucketsResult {
    #[serde(rename = "Buckets", default)]
    buckets: BucketList,
}

#[derive(Debug, Default, Deserialize)]
struct BucketList {
    #[serde(rename = "Bucket", default)]
    bucket: Vec<BucketEntry>,
}

#[derive(Debug, Deserialize)]
struct BucketEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "CreationDate")]
    creation_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListBucketResult {
    #[serde(rename = "Contents", default)]
    contents: Vec<ContentsEntry>,
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "NextContinuationToken")]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Size", default)]
    size: u64,
    #[serde(rename = "LastModified")]
    last_modified: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Parse a `ListAllMyBucketsResult` document
pub fn parse_list_buckets(xml: &str) -> Result<Vec<BucketInfo>> {
    let result: ListAllMyBucketsResult = quick_xml::de::from_str(xml)
        .map_err(|e| BackendError::unknown(format!("malformed ListBuckets response: {}", e)))?;

    Ok(result
        .buckets
        .bucket
        .into_iter()
        .map(|b| BucketInfo {
            name: b.name,
            created_at: b.creation_date.as_deref().and_then(|d| parse_timestamp(d).ok()),
        })
        .collect())
}

/// Parse a `ListBucketResult` (ListObjectsV2) document
pub fn parse_list_objects(xml: &str) -> Result<ListingPage> {
    let result: ListBucketResult = quick_xml::de::from_str(xml)
        .map_err(|e| BackendError::unknown(format!("malformed ListObjectsV2 response: {}", e)))?;

    let items = result
        .contents
        .into_iter()
        .map(|c| {
            Ok(ObjectSummary {
                last_modified: parse_timestamp(&c.last_modified)?,
                key: c.key,
                size: c.size,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let continuation_token = if result.is_truncated {
        result.next_continuation_token
    } else {
        None
    };

    Ok(ListingPage {
        items,
        continuation_token,
    })
}

/// Extract `(Code, Message)` from an S3 error document
pub fn parse_error(xml: &str) -> Option<(String, String)> {
    quick_xml::de::from_str::<ErrorBody>(xml)
        .ok()
        .map(|e| (e.code, e.message))
}

/// Request body for creating a bucket outside us-east-1
pub fn create_bucket_configuration(region: &str) -> String {
    format!(
        r#"<CreateBucketConfiguration xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>"#,
        region
    )
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BackendError::unknown(format!("malformed timestamp {:?}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_buckets() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListAllMyBucketsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
    <Owner><ID>abc</ID><DisplayName>me</DisplayName></Owner>
    <Buckets>
        <Bucket><Name>alpha</Name><CreationDate>2024-01-02T03:04:05.000Z</CreationDate></Bucket>
        <Bucket><Name>beta</Name><CreationDate>2024-02-02T03:04:05.000Z</CreationDate></Bucket>
    </Buckets>
</ListAllMyBucketsResult>"#;

        let buckets = parse_list_buckets(xml).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].name, "alpha");
        assert_eq!(
            buckets[0].created_at.unwrap().to_rfc3339(),
            "2024-01-02T03:04:05+00:00"
        );
    }

    #[test]
    fn test_parse_list_objects_truncated() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
    <Name>docs</Name>
    <Prefix>reports/</Prefix>
    <KeyCount>2</KeyCount>
    <MaxKeys>2</MaxKeys>
    <IsTruncated>true</IsTruncated>
    <NextContinuationToken>opaque-token</NextContinuationToken>
    <Contents>
        <Key>reports/q1.pdf</Key>
        <LastModified>2024-03-01T00:00:00.000Z</LastModified>
        <ETag>"abc"</ETag>
        <Size>1024</Size>
        <StorageClass>STANDARD</StorageClass>
    </Contents>
    <Contents>
        <Key>reports/q2.pdf</Key>
        <LastModified>2024-06-01T00:00:00.000Z</LastModified>
        <ETag>"def"</ETag>
        <Size>2048</Size>
        <StorageClass>STANDARD</StorageClass>
    </Contents>
</ListBucketResult>"#;

        let page = parse_list_objects(xml).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].key, "reports/q1.pdf");
        assert_eq!(page.items[1].size, 2048);
        assert_eq!(page.continuation_token.as_deref(), Some("opaque-token"));
    }

    #[test]
    fn test_parse_empty_listing() {
        let xml = r#"<ListBucketResult><Name>empty-bucket</Name><KeyCount>0</KeyCount><IsTruncated>false</IsTruncated></ListBucketResult>"#;

        let page = parse_list_objects(xml).unwrap();
        assert!(page.items.is_empty());
        assert!(page.continuation_token.is_none());
    }

    #[test]
    fn test_parse_error() {
        let xml = r#"<?xml version="1.0"?>
<Error>
    <Code>NoSuchKey</Code>
    <Message>The specified key does not exist.</Message>
    <RequestId>abc123</RequestId>
</Error>"#;

        let (code, message) = parse_error(xml).unwrap();
        assert_eq!(code, "NoSuchKey");
        assert_eq!(message, "The specified key does not exist.");
        assert!(parse_error("not xml").is_none());
    }
}
