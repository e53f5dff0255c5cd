//! Mock implementations for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rum_storage::{ListResult, MemoryStore, ObjectHead, ObjectStore, PutOptions, Result, StorageError};

/// Per-operation call counts.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub get: AtomicUsize,
    pub put: AtomicUsize,
    pub head: AtomicUsize,
    pub remove: AtomicUsize,
    pub list: AtomicUsize,
    pub copy: AtomicUsize,
}

/// Object store that records calls and can inject failures.
///
/// Wraps a `MemoryStore`, so it goes through the same `ObjectStore` trait
/// the bundler uses in production and keeps real contents to assert on.
#[derive(Clone)]
pub struct RecordingStore {
    inner: MemoryStore,
    calls: Arc<CallCounts>,
    /// Paths written, in call order (failed attempts included).
    writes: Arc<Mutex<Vec<String>>>,
    /// Writes to keys containing one of these fail.
    failing_writes: Arc<Mutex<Vec<String>>>,
    /// Reads of keys containing one of these fail.
    failing_reads: Arc<Mutex<Vec<String>>>,
    /// Simulate failures of every write if set.
    should_fail: Arc<Mutex<bool>>,
    list_delay: Arc<Mutex<Option<Duration>>>,
}

impl RecordingStore {
    pub fn new(name: &str) -> Self {
        Self {
            inner: MemoryStore::new(name),
            calls: Arc::new(CallCounts::default()),
            writes: Arc::new(Mutex::new(Vec::new())),
            failing_writes: Arc::new(Mutex::new(Vec::new())),
            failing_reads: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
            list_delay: Arc::new(Mutex::new(None)),
        }
    }

    /// The wrapped store, for seeding and inspection without counting.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    pub fn list_calls(&self) -> usize {
        self.calls.list.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    /// Make every write to a key containing `pattern` fail.
    pub fn fail_writes_to(&self, pattern: impl Into<String>) {
        self.failing_writes.lock().push(pattern.into());
    }

    /// Make every read of a key containing `pattern` fail.
    pub fn fail_reads_of(&self, pattern: impl Into<String>) {
        self.failing_reads.lock().push(pattern.into());
    }

    /// Set failure mode for all writes.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }

    /// Delay every listing, to make iterations slow.
    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock() = Some(delay);
    }

    fn write_fails(&self, key: &str) -> bool {
        *self.should_fail.lock()
            || self
                .failing_writes
                .lock()
                .iter()
                .any(|pattern| key.contains(pattern.as_str()))
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        let fails = self
            .failing_reads
            .lock()
            .iter()
            .any(|pattern| key.contains(pattern.as_str()));
        if fails {
            return Err(StorageError::backend("get", key, "injected failure"));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, body: Bytes, options: PutOptions) -> Result<()> {
        self.calls.put.fetch_add(1, Ordering::SeqCst);
        self.writes.lock().push(key.to_string());
        if self.write_fails(key) {
            return Err(StorageError::backend("put", key, "injected failure"));
        }
        self.inner.put(key, body, options).await
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectHead>> {
        self.calls.head.fetch_add(1, Ordering::SeqCst);
        self.inner.head(key).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.calls.remove.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(key).await
    }

    async fn list_after(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<ListResult> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.list_after(prefix, start_after, limit).await
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        self.calls.copy.fetch_add(1, Ordering::SeqCst);
        self.inner.copy(src, dst).await
    }

    async fn put_if_absent(&self, key: &str, body: Bytes, options: PutOptions) -> Result<bool> {
        self.calls.put.fetch_add(1, Ordering::SeqCst);
        self.inner.put_if_absent(key, body, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_store_counts_and_fails() {
        let store = RecordingStore::new("test");
        store.fail_writes_to("/10.json");

        store
            .put("a/9.json", Bytes::from_static(b"{}"), PutOptions::json())
            .await
            .unwrap();
        let err = store
            .put("a/10.json", Bytes::from_static(b"{}"), PutOptions::json())
            .await;

        assert!(err.is_err());
        assert_eq!(store.calls().put.load(Ordering::SeqCst), 2);
        assert_eq!(store.writes(), vec!["a/9.json", "a/10.json"]);
        assert!(store.inner().contains("a/9.json"));
        assert!(!store.inner().contains("a/10.json"));
    }

    #[tokio::test]
    async fn test_injected_read_failure() {
        let store = RecordingStore::new("test");
        store
            .inner()
            .put("raw/a.log", Bytes::from_static(b"x"), PutOptions::default())
            .await
            .unwrap();
        store.fail_reads_of("raw/a.log");

        assert!(store.get("raw/a.log").await.is_err());
        assert!(store.get("raw/b.log").await.unwrap().is_none());
    }
}
