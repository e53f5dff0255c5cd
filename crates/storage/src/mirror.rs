//! Dual-write wrapper: reads from the primary, writes to both.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use crate::error::Result;
use crate::store::{ListResult, ObjectHead, ObjectStore, PutOptions};

/// Mirrors every mutation to a secondary replica.
///
/// The primary is authoritative: its result is returned, and a failed
/// secondary write is logged and otherwise ignored.
pub struct MirroredStore {
    name: String,
    primary: Arc<dyn ObjectStore>,
    secondary: Arc<dyn ObjectStore>,
}

impl MirroredStore {
    pub fn new(primary: Arc<dyn ObjectStore>, secondary: Arc<dyn ObjectStore>) -> Self {
        Self {
            name: format!("{}+{}", primary.name(), secondary.name()),
            primary,
            secondary,
        }
    }

    fn mirror_failed(&self, op: &'static str, key: &str, result: Result<()>) {
        if let Err(e) = result {
            warn!(
                op = op,
                key = key,
                replica = self.secondary.name(),
                error = %e,
                "Mirror write failed"
            );
        }
    }
}

#[async_trait]
impl ObjectStore for MirroredStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.primary.get(key).await
    }

    async fn put(&self, key: &str, body: Bytes, options: PutOptions) -> Result<()> {
        let (primary, secondary) = tokio::join!(
            self.primary.put(key, body.clone(), options.clone()),
            self.secondary.put(key, body, options),
        );
        self.mirror_failed("put", key, secondary);
        primary
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectHead>> {
        self.primary.head(key).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let (primary, secondary) =
            tokio::join!(self.primary.remove(key), self.secondary.remove(key));
        self.mirror_failed("remove", key, secondary);
        primary
    }

    async fn list_after(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<ListResult> {
        self.primary.list_after(prefix, start_after, limit).await
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let (primary, secondary) =
            tokio::join!(self.primary.copy(src, dst), self.secondary.copy(src, dst));
        self.mirror_failed("copy", dst, secondary);
        primary
    }

    /// Only the primary arbitrates; the replica gets a plain put on success.
    async fn put_if_absent(&self, key: &str, body: Bytes, options: PutOptions) -> Result<bool> {
        let written = self
            .primary
            .put_if_absent(key, body.clone(), options.clone())
            .await?;
        if written {
            let secondary = self.secondary.put(key, body, options).await;
            self.mirror_failed("put", key, secondary);
        }
        Ok(written)
    }
}
