//! S3 (and S3-compatible) backend.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::{ByteStream, DateTime as S3DateTime};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::store::{ListResult, ListedObject, ObjectHead, ObjectStore, PutOptions};

/// HTTP statuses S3 answers a failed `If-None-Match: *` with.
const PRECONDITION_FAILED: u16 = 412;
const CONDITIONAL_CONFLICT: u16 = 409;

/// One bucket behind the facade.
#[derive(Clone)]
pub struct S3Store {
    client: S3Client,
    bucket: String,
}

impl S3Store {
    /// Builds a client from the ambient AWS configuration plus overrides.
    pub async fn connect(config: &StorageConfig, bucket: &str) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = S3ConfigBuilder::from(&aws_config);

        // MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        info!(bucket = %bucket, region = %config.region, "S3 store initialized");

        Self::from_client(S3Client::from_conf(builder.build()), bucket)
    }

    pub fn from_client(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn to_chrono(ts: &S3DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        &self.bucket
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                if e.as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    return Ok(None);
                }
                return Err(StorageError::backend("get", key, e));
            }
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::backend("get", key, e))?;

        Ok(Some(body.into_bytes()))
    }

    async fn put(&self, key: &str, body: Bytes, options: PutOptions) -> Result<()> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(options.content_type)
            .set_expires(options.expires.map(|t| S3DateTime::from_secs(t.timestamp())))
            .set_metadata((!options.metadata.is_empty()).then_some(options.metadata))
            .send()
            .await
            .map_err(|e| StorageError::backend("put", key, e))?;

        debug!(bucket = %self.bucket, key = key, size = size, "Stored object");
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectHead>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectHead {
                key: key.to_string(),
                size: output.content_length().unwrap_or_default().max(0) as u64,
                content_type: output.content_type().map(str::to_string),
                last_modified: output.last_modified().and_then(to_chrono),
                metadata: output.metadata().cloned().unwrap_or_else(HashMap::new),
            })),
            Err(e) => {
                if e.as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(None)
                } else {
                    Err(StorageError::backend("head", key, e))
                }
            }
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::backend("remove", key, e))?;
        Ok(())
    }

    async fn list_after(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<ListResult> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_start_after(start_after.map(str::to_string))
            .max_keys(i32::try_from(limit).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|e| StorageError::backend("list", prefix, e))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|obj| {
                obj.key().map(|key| ListedObject {
                    key: key.to_string(),
                    size: obj.size().unwrap_or_default().max(0) as u64,
                })
            })
            .collect();

        Ok(ListResult {
            objects,
            is_truncated: output.is_truncated().unwrap_or(false),
        })
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, src))
            .key(dst)
            .send()
            .await
            .map_err(|e| StorageError::backend("copy", src, e))?;
        Ok(())
    }

    /// Uses S3's conditional write, so the check and the write are atomic.
    async fn put_if_absent(&self, key: &str, body: Bytes, options: PutOptions) -> Result<bool> {
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .if_none_match("*")
            .body(ByteStream::from(body))
            .set_content_type(options.content_type)
            .set_metadata((!options.metadata.is_empty()).then_some(options.metadata))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let status = e.raw_response().map(|r| r.status().as_u16());
                if matches!(status, Some(PRECONDITION_FAILED | CONDITIONAL_CONFLICT)) {
                    Ok(false)
                } else {
                    Err(StorageError::backend("put_if_absent", key, e))
                }
            }
        }
    }
}
