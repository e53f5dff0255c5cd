//! Common test setup functions.

use std::sync::Arc;

use bundler::{BatchDriver, BundlerConfig, VirtualRouter};
use rum_core::{BundleGroupData, ManifestData};
use rum_storage::{ObjectStore, PutOptions, Stores};

use crate::fixtures::ndjson;
use crate::mocks::RecordingStore;

/// Test context with recording logs and bundles buckets.
pub struct TestContext {
    pub logs: RecordingStore,
    pub bundles: RecordingStore,
}

impl TestContext {
    pub fn new() -> Self {
        telemetry::init_tracing(telemetry::TracingConfig::new().with_filter("warn"));
        Self {
            logs: RecordingStore::new("logs"),
            bundles: RecordingStore::new("bundles"),
        }
    }

    pub fn stores(&self) -> Stores {
        Stores {
            logs: Arc::new(self.logs.clone()),
            bundles: Arc::new(self.bundles.clone()),
        }
    }

    /// A driver with no virtual rules.
    pub fn driver(&self) -> BatchDriver {
        self.driver_with(test_config())
            .with_virtual_router(VirtualRouter::empty())
    }

    /// A driver with the configured (or default) virtual rules.
    pub fn driver_with(&self, config: BundlerConfig) -> BatchDriver {
        BatchDriver::new(self.stores(), config).expect("valid test config")
    }

    /// Drops a raw log file into `raw/`.
    pub async fn upload_raw(&self, name: &str, events: &[serde_json::Value]) {
        self.logs
            .inner()
            .put(&format!("raw/{name}"), ndjson(events), PutOptions::default())
            .await
            .expect("seed raw file");
    }

    pub async fn bundle_group(&self, path: &str) -> Option<BundleGroupData> {
        let body = self.bundles.inner().get(path).await.ok()??;
        serde_json::from_slice(&body).ok()
    }

    pub async fn manifest(&self, path: &str) -> Option<ManifestData> {
        let body = self.bundles.inner().get(path).await.ok()??;
        serde_json::from_slice(&body).ok()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Fast, deterministic configuration.
pub fn test_config() -> BundlerConfig {
    BundlerConfig {
        write_backoff_ms: 1,
        sample_seed: Some(42),
        ..BundlerConfig::default()
    }
}
