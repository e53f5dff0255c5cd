//! Memoizing LRU cache for hydrated aggregates.
//!
//! Each key maps to a shared once-cell so concurrent callers asking for the
//! same key wait on a single load. When the cache reaches its capacity a
//! purge scans the least-recently-used fraction of entries and evicts only
//! the ones that are resolved, report themselves inactive and are not
//! referenced outside the cache. Pending loads, dirty aggregates and values
//! a caller still holds always survive, so the cache may grow past its
//! capacity while many entries are in use.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rum_core::{Aggregate, AggregateData};
use tokio::sync::OnceCell;
use tracing::debug;

/// A cached value that can veto its own eviction.
pub trait Evictable: Send + Sync + 'static {
    /// True while the value holds state that has not been persisted.
    fn is_active(&self) -> bool;
}

impl<T: AggregateData> Evictable for Aggregate<T> {
    fn is_active(&self) -> bool {
        self.is_dirty()
    }
}

/// Cache sizing.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Size at which an insert triggers a purge
    pub capacity: usize,
    /// Fraction of entries, least recently used first, scanned per purge
    pub purge_fraction: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            purge_fraction: 0.5,
        }
    }
}

struct Slot<V> {
    cell: Arc<OnceCell<Arc<V>>>,
    last_access: Instant,
}

impl<V> Slot<V> {
    fn pending() -> Self {
        Self {
            cell: Arc::new(OnceCell::new()),
            last_access: Instant::now(),
        }
    }

    fn resolved(value: Arc<V>) -> Self {
        Self {
            cell: Arc::new(OnceCell::new_with(Some(value))),
            last_access: Instant::now(),
        }
    }
}

/// Keyed memoizing cache with dirty-aware LRU purging.
pub struct ResourceCache<V> {
    config: CacheConfig,
    slots: Mutex<HashMap<String, Slot<V>>>,
}

impl<V: Evictable> ResourceCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the resolved value for `key`, refreshing its recency.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(key)?;
        let value = slot.cell.get()?.clone();
        slot.last_access = Instant::now();
        Some(value)
    }

    /// True if `key` has an entry, resolved or still loading.
    pub fn has(&self, key: &str) -> bool {
        self.slots.lock().contains_key(key)
    }

    /// Stores a resolved value, replacing any existing entry.
    pub fn set(&self, key: impl Into<String>, value: Arc<V>) {
        let key = key.into();
        let mut slots = self.slots.lock();
        if !slots.contains_key(&key) {
            self.purge_if_full(&mut slots);
        }
        slots.insert(key, Slot::resolved(value));
    }

    /// Returns the value for `key`, running `init` at most once across
    /// concurrent callers. A failed load leaves no entry behind.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: &str, init: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = {
            let mut slots = self.slots.lock();
            match slots.get_mut(key) {
                Some(slot) => {
                    slot.last_access = Instant::now();
                    slot.cell.clone()
                }
                None => {
                    self.purge_if_full(&mut slots);
                    let slot = Slot::pending();
                    let cell = slot.cell.clone();
                    slots.insert(key.to_string(), slot);
                    cell
                }
            }
        };

        match cell.get_or_try_init(|| async move { init().await.map(Arc::new) }).await {
            Ok(value) => Ok(value.clone()),
            Err(e) => {
                let mut slots = self.slots.lock();
                let stale = slots
                    .get(key)
                    .is_some_and(|slot| Arc::ptr_eq(&slot.cell, &cell) && !slot.cell.initialized());
                if stale {
                    slots.remove(key);
                }
                Err(e)
            }
        }
    }

    /// Runs a purge regardless of size. Returns the number of evicted entries.
    pub fn purge(&self) -> usize {
        let mut slots = self.slots.lock();
        self.purge_locked(&mut slots)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    fn purge_if_full(&self, slots: &mut HashMap<String, Slot<V>>) {
        if slots.len() >= self.config.capacity {
            self.purge_locked(slots);
        }
    }

    fn purge_locked(&self, slots: &mut HashMap<String, Slot<V>>) -> usize {
        let before = slots.len();
        if before == 0 {
            return 0;
        }

        let mut by_recency: Vec<(Instant, String)> = slots
            .iter()
            .map(|(key, slot)| (slot.last_access, key.clone()))
            .collect();
        by_recency.sort();

        let fraction = self.config.purge_fraction.clamp(0.0, 1.0);
        let scan = ((before as f64 * fraction).ceil() as usize).max(1);

        for (_, key) in by_recency.into_iter().take(scan) {
            // A held value would be orphaned: the next load of the key
            // would hydrate a second, diverging copy.
            let evictable = slots
                .get(&key)
                .and_then(|slot| slot.cell.get())
                .is_some_and(|value| Arc::strong_count(value) == 1 && !value.is_active());
            if evictable {
                slots.remove(&key);
            }
        }

        let evicted = before - slots.len();
        debug!(evicted, remaining = slots.len(), "Resource cache purged");
        evicted
    }
}
