//! Per-run access to manifests and bundle groups.

use std::sync::Arc;

use rum_core::{Aggregate, AggregateData, BundleGroup, Manifest, PartitionKey};
use rum_storage::DynStore;
use telemetry::metrics;
use tracing::debug;

use crate::cache::{CacheConfig, Evictable, ResourceCache};
use crate::error::Result;

/// Owns the bundles store and the caches of hydrated aggregates.
///
/// Created once per run. Every aggregate touched during the run stays in
/// memory until it is flushed; clean entries may be evicted and re-read.
pub struct BundleContext {
    store: DynStore,
    manifests: ResourceCache<Manifest>,
    groups: ResourceCache<BundleGroup>,
}

impl BundleContext {
    pub fn new(store: DynStore, cache: CacheConfig) -> Self {
        Self {
            store,
            manifests: ResourceCache::new(cache),
            groups: ResourceCache::new(cache),
        }
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    /// The manifest for the day of `key`.
    pub async fn manifest(&self, key: &PartitionKey) -> Result<Arc<Manifest>> {
        let key = key.with_hour(0);
        load(&self.store, &self.manifests, key).await
    }

    /// The bundle group for the hour of `key`.
    pub async fn bundle_group(&self, key: &PartitionKey) -> Result<Arc<BundleGroup>> {
        load(&self.store, &self.groups, key.clone()).await
    }

    /// Cached entries: (manifests, bundle groups).
    pub fn cached(&self) -> (usize, usize) {
        (self.manifests.len(), self.groups.len())
    }
}

async fn load<T>(
    store: &DynStore,
    cache: &ResourceCache<Aggregate<T>>,
    key: PartitionKey,
) -> Result<Arc<Aggregate<T>>>
where
    T: AggregateData,
    Aggregate<T>: Evictable,
{
    let cache_key = format!("{}:{}", T::KIND, key.cache_key());
    cache
        .get_or_try_init(&cache_key, || hydrate::<T>(store, key))
        .await
}

/// Reads an aggregate from storage. A missing object yields an empty one;
/// any other read failure is an error so existing data is never replaced.
async fn hydrate<T: AggregateData>(store: &DynStore, key: PartitionKey) -> Result<Aggregate<T>> {
    let path = T::storage_path(&key);
    match store.get(&path).await? {
        Some(body) => {
            metrics().aggregates_loaded.inc();
            Ok(Aggregate::from_slice(key, &body)?)
        }
        None => {
            debug!(kind = T::KIND, path = %path, "No stored aggregate, starting empty");
            Ok(Aggregate::new(key))
        }
    }
}
