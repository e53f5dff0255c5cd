//! Dirty-tracked in-memory aggregates hydrated from and flushed to storage.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::partition::PartitionKey;

/// Payload of an aggregate: the JSON document stored at one path.
pub trait AggregateData: Serialize + DeserializeOwned + Default + Send + 'static {
    /// Label used in logs and metrics.
    const KIND: &'static str;

    fn storage_path(key: &PartitionKey) -> String;

    /// Canonical form of the key this aggregate is addressed by.
    fn normalize_key(key: PartitionKey) -> PartitionKey {
        key
    }
}

/// A mutable aggregate plus the flag that says it has unflushed changes.
///
/// Mutations take the inner lock briefly and never across an await, so
/// concurrent partition tasks touching the same aggregate serialize here.
#[derive(Debug)]
pub struct Aggregate<T> {
    key: PartitionKey,
    data: Mutex<T>,
    dirty: AtomicBool,
}

impl<T: AggregateData> Aggregate<T> {
    /// An empty aggregate, for keys with nothing in storage yet.
    pub fn new(key: PartitionKey) -> Self {
        Self::from_data(key, T::default())
    }

    pub fn from_data(key: PartitionKey, data: T) -> Self {
        Self {
            key: T::normalize_key(key),
            data: Mutex::new(data),
            dirty: AtomicBool::new(false),
        }
    }

    /// Hydrates from a stored JSON document.
    pub fn from_slice(key: PartitionKey, bytes: &[u8]) -> Result<Self> {
        let data: T = serde_json::from_slice(bytes)?;
        Ok(Self::from_data(key, data))
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    pub fn kind(&self) -> &'static str {
        T::KIND
    }

    pub fn storage_path(&self) -> String {
        T::storage_path(&self.key)
    }

    /// True while there are mutations not yet written back.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Called after a successful flush.
    pub fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&*self.data.lock())?)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
        self.data.lock()
    }

    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }
}

impl<T: AggregateData + Clone> Aggregate<T> {
    /// Copy of the current contents.
    pub fn snapshot(&self) -> T {
        self.data.lock().clone()
    }
}
