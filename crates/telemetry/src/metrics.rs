//! In-process bundling metrics.
//!
//! Counters accumulate over the life of the process; `serve` mode logs a
//! snapshot after every run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A point-in-time value.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Latency histogram with buckets sized for storage calls and iterations.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 10ms, 50ms, 100ms, 500ms, 1s, 5s, 10s, 30s, 1m, 5m, 10m
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
    max: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [
        10, 50, 100, 500, 1_000, 5_000, 10_000, 30_000, 60_000, 300_000, 600_000,
    ];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            max: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.max.fetch_max(ms, Ordering::Relaxed);

        let bucket = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// (upper bound in ms, count) per bucket.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Counters for the bundler.
#[derive(Debug, Default)]
pub struct Metrics {
    // Runs
    pub runs_started: Counter,
    pub runs_conflicted: Counter,
    pub runs_over_budget: Counter,

    // Raw input
    pub files_listed: Counter,
    pub files_processed: Counter,
    pub files_failed: Counter,
    pub lines_parsed: Counter,
    pub parse_failures: Counter,
    pub events_rejected: Counter,

    // Routing
    pub events_bundled: Counter,
    pub virtual_events: Counter,
    pub route_failures: Counter,
    pub aggregates_loaded: Counter,

    // Flush
    pub bundle_groups_written: Counter,
    pub manifests_written: Counter,
    pub write_failures: Counter,

    // Latency
    pub iteration_latency_ms: Histogram,
    pub flush_latency_ms: Histogram,

    pub cached_aggregates: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub runs_started: u64,
    pub runs_conflicted: u64,
    pub runs_over_budget: u64,
    pub files_listed: u64,
    pub files_processed: u64,
    pub files_failed: u64,
    pub lines_parsed: u64,
    pub parse_failures: u64,
    pub events_rejected: u64,
    pub events_bundled: u64,
    pub virtual_events: u64,
    pub route_failures: u64,
    pub aggregates_loaded: u64,
    pub bundle_groups_written: u64,
    pub manifests_written: u64,
    pub write_failures: u64,
    pub iteration_latency_mean_ms: f64,
    pub iteration_latency_max_ms: u64,
    pub flush_latency_mean_ms: f64,
    pub cached_aggregates: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            runs_started: self.runs_started.get(),
            runs_conflicted: self.runs_conflicted.get(),
            runs_over_budget: self.runs_over_budget.get(),
            files_listed: self.files_listed.get(),
            files_processed: self.files_processed.get(),
            files_failed: self.files_failed.get(),
            lines_parsed: self.lines_parsed.get(),
            parse_failures: self.parse_failures.get(),
            events_rejected: self.events_rejected.get(),
            events_bundled: self.events_bundled.get(),
            virtual_events: self.virtual_events.get(),
            route_failures: self.route_failures.get(),
            aggregates_loaded: self.aggregates_loaded.get(),
            bundle_groups_written: self.bundle_groups_written.get(),
            manifests_written: self.manifests_written.get(),
            write_failures: self.write_failures.get(),
            iteration_latency_mean_ms: self.iteration_latency_ms.mean(),
            iteration_latency_max_ms: self.iteration_latency_ms.max(),
            flush_latency_mean_ms: self.flush_latency_ms.mean(),
            cached_aggregates: self.cached_aggregates.get(),
        }
    }

    /// Logs the current snapshot as one structured line.
    pub fn log_snapshot(&self) {
        match serde_json::to_string(&self.snapshot()) {
            Ok(snapshot) => tracing::info!(metrics = %snapshot, "Bundler metrics"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize metrics snapshot"),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
