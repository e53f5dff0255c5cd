//! Storage configuration and store construction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::memory::MemoryStore;
use crate::mirror::MirroredStore;
use crate::s3::S3Store;
use crate::store::ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    S3,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// Bucket holding `raw/`, `processed/` and the lock marker
    #[serde(default = "default_logs_bucket")]
    pub logs_bucket: String,
    /// Bucket holding manifests and bundle groups
    #[serde(default = "default_bundles_bucket")]
    pub bundles_bucket: String,
    /// Optional replica every bundle write is mirrored to
    #[serde(default)]
    pub mirror_bundles_bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible stores
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_backend() -> BackendKind {
    BackendKind::Memory
}

fn default_logs_bucket() -> String {
    "helix-rum-logs".to_string()
}

fn default_bundles_bucket() -> String {
    "helix-rum-bundles".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            logs_bucket: default_logs_bucket(),
            bundles_bucket: default_bundles_bucket(),
            mirror_bundles_bucket: None,
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

/// Shared handle to any backend.
pub type DynStore = Arc<dyn ObjectStore>;

/// The two buckets the bundler works on.
#[derive(Clone)]
pub struct Stores {
    pub logs: DynStore,
    pub bundles: DynStore,
}

impl StorageConfig {
    /// Connects the configured backend.
    pub async fn build(&self) -> Stores {
        let (logs, bundles, mirror): (DynStore, DynStore, Option<DynStore>) =
            match self.backend {
                BackendKind::Memory => (
                    Arc::new(MemoryStore::new(&self.logs_bucket)),
                    Arc::new(MemoryStore::new(&self.bundles_bucket)),
                    self.mirror_bundles_bucket
                        .as_deref()
                        .map(|b| Arc::new(MemoryStore::new(b)) as DynStore),
                ),
                BackendKind::S3 => {
                    let mirror = match self.mirror_bundles_bucket.as_deref() {
                        Some(bucket) => Some(Arc::new(S3Store::connect(self, bucket).await) as DynStore),
                        None => None,
                    };
                    (
                        Arc::new(S3Store::connect(self, &self.logs_bucket).await),
                        Arc::new(S3Store::connect(self, &self.bundles_bucket).await),
                        mirror,
                    )
                }
            };

        let bundles = match mirror {
            Some(replica) => {
                info!(replica = replica.name(), "Mirroring bundle writes");
                Arc::new(MirroredStore::new(bundles, replica)) as DynStore
            }
            None => bundles,
        };

        Stores { logs, bundles }
    }
}
