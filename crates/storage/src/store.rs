//! The object store contract the bundler is written against.
//!
//! Backends provide get/put/head/remove/list_after/copy over one bucket. `move`
//! and the lock primitive `put_if_absent` have default implementations in
//! terms of the others; backends with native support override them.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{Result, StorageError};

/// Content type of manifests and bundle groups.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Options attached to a write.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

impl PutOptions {
    pub fn json() -> Self {
        Self {
            content_type: Some(CONTENT_TYPE_JSON.to_string()),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }
}

/// Metadata of a stored object.
#[derive(Debug, Clone)]
pub struct ObjectHead {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

/// One entry of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
}

impl ListedObject {
    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// A bounded listing; `is_truncated` says more objects match the prefix.
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub objects: Vec<ListedObject>,
    pub is_truncated: bool,
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Short backend label for logs.
    fn name(&self) -> &str;

    /// Reads an entire object. `Ok(None)` when it does not exist.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    async fn put(&self, key: &str, body: Bytes, options: PutOptions) -> Result<()>;

    /// Object metadata without the body. `Ok(None)` when it does not exist.
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>>;

    /// Deletes an object. Succeeds when it does not exist.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Lists up to `limit` objects under `prefix` whose keys sort strictly
    /// after `start_after`, in key order.
    async fn list_after(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<ListResult>;

    /// Server-side copy; fails with `NotFound` when `src` is missing.
    async fn copy(&self, src: &str, dst: &str) -> Result<()>;

    /// First page of `prefix`.
    async fn list(&self, prefix: &str, limit: usize) -> Result<ListResult> {
        self.list_after(prefix, None, limit).await
    }

    async fn remove_many(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }

    /// Copy then delete. Not atomic: a failure between the two steps
    /// leaves the object at both keys.
    async fn move_object(&self, src: &str, dst: &str) -> Result<()> {
        self.copy(src, dst).await?;
        self.remove(src).await
    }

    /// Writes only when `key` does not exist yet; returns whether it wrote.
    ///
    /// The default is head-then-put and therefore advisory: two callers
    /// racing between the head and the put both win.
    async fn put_if_absent(&self, key: &str, body: Bytes, options: PutOptions) -> Result<bool> {
        if self.head(key).await?.is_some() {
            return Ok(false);
        }
        self.put(key, body, options).await?;
        Ok(true)
    }

    /// Like `get`, but a missing object is an error.
    async fn get_required(&self, key: &str) -> Result<Bytes> {
        self.get(key)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}
