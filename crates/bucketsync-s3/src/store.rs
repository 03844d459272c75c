//! S3ObjectStore - IObjectStore implementation for S3-compatible services
//!
//! Maps each port call onto a single SDK request:
//!
//! | port            | request          |
//! |-----------------|------------------|
//! | `list_objects`  | `ListObjectsV2`  |
//! | `get_object`    | `GetObject`      |
//! | `put_object`    | `PutObject`      |
//! | `delete_object` | `DeleteObject`   |
//!
//! SDK errors are rendered with their full source chain so the message
//! attached to a failed operation names the actual cause.

use anyhow::Result;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::{ByteStream, DateTime as SmithyDateTime};
use aws_sdk_s3::types::Object;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use bucketsync_core::ports::{IObjectStore, ObjectInfo, ObjectPage};

use crate::S3Error;

/// Object store backed by an `aws_sdk_s3::Client`
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    etags_are_md5: bool,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            etags_are_md5: true,
        }
    }

    /// Whether listed ETags may be reused as content fingerprints
    pub fn with_md5_etags(mut self, etags_are_md5: bool) -> Self {
        self.etags_are_md5 = etags_are_md5;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn request_error<E>(operation: &'static str, bucket: &str, key: &str, error: E) -> S3Error
where
    E: std::error::Error,
{
    S3Error::Request {
        operation,
        bucket: bucket.to_string(),
        key: key.to_string(),
        message: DisplayErrorContext(error).to_string(),
    }
}

/// Convert an SDK timestamp, rejecting values chrono cannot represent
pub(crate) fn to_chrono(timestamp: &SmithyDateTime) -> Result<DateTime<Utc>, S3Error> {
    DateTime::from_timestamp(timestamp.secs(), timestamp.subsec_nanos()).ok_or_else(|| {
        S3Error::InvalidResponse(format!("timestamp out of range: {timestamp}"))
    })
}

/// Convert one listed object
///
/// Objects without a key are invalid. A missing size counts as empty and a
/// missing timestamp as the Unix epoch, so such objects always look older
/// than their local counterpart.
pub(crate) fn to_object_info(object: &Object) -> Result<ObjectInfo, S3Error> {
    let key = object
        .key()
        .ok_or_else(|| S3Error::InvalidResponse("listed object without a key".to_string()))?;

    let last_modified = match object.last_modified() {
        Some(timestamp) => to_chrono(timestamp)?,
        None => DateTime::<Utc>::default(),
    };

    Ok(ObjectInfo {
        key: key.to_string(),
        size: object.size().unwrap_or(0).max(0) as u64,
        last_modified,
        etag: object.e_tag().map(str::to_string),
    })
}

/// Converts a listed object, withholding its ETag when it is not a content digest
pub(crate) fn listed_object(object: &Object, etags_are_md5: bool) -> Result<ObjectInfo, S3Error> {
    let mut info = to_object_info(object)?;
    if !etags_are_md5 {
        info.etag = None;
    }
    Ok(info)
}

#[async_trait::async_trait]
impl IObjectStore for S3ObjectStore {
    #[instrument(skip(self), level = "debug")]
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ObjectPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation.map(str::to_string));
        if !prefix.is_empty() {
            request = request.prefix(prefix);
        }

        let output = request
            .send()
            .await
            .map_err(|e| request_error("ListObjectsV2", bucket, prefix, e))?;

        let objects = output
            .contents()
            .iter()
            .map(|object| listed_object(object, self.etags_are_md5))
            .collect::<Result<Vec<_>, _>>()?;

        // Some S3-compatible services return a token on the last page
        let next_continuation = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        debug!(
            count = objects.len(),
            more = next_continuation.is_some(),
            "Listed page"
        );
        Ok(ObjectPage {
            objects,
            next_continuation,
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    S3Error::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    request_error("GetObject", bucket, key, service_error)
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| request_error("GetObject", bucket, key, e))?
            .into_bytes();
        Ok(data.to_vec())
    }

    #[instrument(skip(self, data), fields(size = data.len()), level = "debug")]
    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| request_error("PutObject", bucket, key, e))?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| request_error("DeleteObject", bucket, key, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_object_info_maps_fields() {
        let object = Object::builder()
            .key("photos/a.jpg")
            .size(42)
            .e_tag("\"9e107d9d372bb6826bd81d3542a419d6\"")
            .last_modified(SmithyDateTime::from_secs(1_700_000_000))
            .build();

        let info = to_object_info(&object).unwrap();
        assert_eq!(info.key, "photos/a.jpg");
        assert_eq!(info.size, 42);
        assert_eq!(
            info.etag.as_deref(),
            Some("\"9e107d9d372bb6826bd81d3542a419d6\"")
        );
        assert_eq!(info.last_modified.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_to_object_info_defaults_missing_metadata() {
        let object = Object::builder().key("empty").build();

        let info = to_object_info(&object).unwrap();
        assert_eq!(info.size, 0);
        assert!(info.etag.is_none());
        assert_eq!(info.last_modified.timestamp(), 0);
    }

    #[test]
    fn test_opaque_etags_are_withheld() {
        let object = Object::builder()
            .key("sse/a.bin")
            .size(7)
            .e_tag("\"0123456789abcdef0123456789abcdef\"")
            .build();

        let trusted = listed_object(&object, true).unwrap();
        assert!(trusted.etag.is_some());

        let opaque = listed_object(&object, false).unwrap();
        assert!(opaque.etag.is_none());
        assert_eq!(opaque.key, "sse/a.bin");
        assert_eq!(opaque.size, 7);
    }

    #[test]
    fn test_object_without_key_is_invalid() {
        let object = Object::builder().size(1).build();
        assert!(matches!(
            to_object_info(&object),
            Err(S3Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_to_chrono_keeps_subsecond_precision() {
        let timestamp = SmithyDateTime::from_secs_and_nanos(1_700_000_000, 250_000_000);
        let converted = to_chrono(&timestamp).unwrap();
        assert_eq!(converted.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_request_error_names_operation_and_key() {
        let error = request_error(
            "PutObject",
            "bucket",
            "a.txt",
            std::io::Error::new(std::io::ErrorKind::TimedOut, "connection timed out"),
        );
        let message = error.to_string();
        assert!(message.starts_with("PutObject s3://bucket/a.txt failed"));
        assert!(message.contains("connection timed out"));
    }
}
