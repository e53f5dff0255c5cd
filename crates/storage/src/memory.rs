//! In-memory backend for tests and local runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{Result, StorageError};
use crate::store::{ListResult, ListedObject, ObjectHead, ObjectStore, PutOptions};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    content_type: Option<String>,
    metadata: HashMap<String, String>,
    last_modified: DateTime<Utc>,
}

/// Thread-safe map of key to object. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    name: String,
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Arc::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    fn insert(objects: &mut BTreeMap<String, StoredObject>, key: &str, body: Bytes, options: PutOptions) {
        objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: options.content_type,
                metadata: options.metadata,
                last_modified: Utc::now(),
            },
        );
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.objects.read().get(key).map(|o| o.body.clone()))
    }

    async fn put(&self, key: &str, body: Bytes, options: PutOptions) -> Result<()> {
        Self::insert(&mut self.objects.write(), key, body, options);
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectHead>> {
        Ok(self.objects.read().get(key).map(|o| ObjectHead {
            key: key.to_string(),
            size: o.body.len() as u64,
            content_type: o.content_type.clone(),
            last_modified: Some(o.last_modified),
            metadata: o.metadata.clone(),
        }))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.objects.write().remove(key);
        Ok(())
    }

    async fn list_after(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<ListResult> {
        let objects = self.objects.read();
        let mut matching = objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| start_after.map_or(true, |after| key.as_str() > after))
            .map(|(key, o)| ListedObject {
                key: key.clone(),
                size: o.body.len() as u64,
            });

        let listed: Vec<_> = matching.by_ref().take(limit).collect();
        let is_truncated = matching.next().is_some();

        Ok(ListResult {
            objects: listed,
            is_truncated,
        })
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let mut objects = self.objects.write();
        let object = objects
            .get(src)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(src.to_string()))?;
        objects.insert(dst.to_string(), object);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, body: Bytes, options: PutOptions) -> Result<bool> {
        let mut objects = self.objects.write();
        if objects.contains_key(key) {
            return Ok(false);
        }
        Self::insert(&mut objects, key, body, options);
        Ok(true)
    }
}
