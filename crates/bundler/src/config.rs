//! Bundler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::virtual_domains::{default_rules, VirtualRuleConfig};

/// Bundler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundlerConfig {
    /// Concurrent storage operations (fetches, writes, moves) and partitions
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Raw files listed per iteration
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// Wall-clock budget of one run in milliseconds
    #[serde(default = "default_max_execution_ms")]
    pub max_execution_ms: u64,
    /// Resource cache size that triggers a purge
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Least-recently-used fraction scanned by a purge
    #[serde(default = "default_cache_purge_fraction")]
    pub cache_purge_fraction: f64,
    /// Period between runs in `serve` mode
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Retries for a failed aggregate write
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,
    /// Backoff between write retries, multiplied by the attempt number
    #[serde(default = "default_write_backoff_ms")]
    pub write_backoff_ms: u64,
    /// Virtual domain rules, applied in order
    #[serde(default = "default_rules")]
    pub virtual_domains: Vec<VirtualRuleConfig>,
    /// Fixed seed for sampling rules; entropy when unset
    #[serde(default)]
    pub sample_seed: Option<u64>,
}

fn default_concurrency() -> usize {
    4
}

fn default_batch_limit() -> usize {
    100
}

fn default_max_execution_ms() -> u64 {
    9 * 60 * 1000
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_cache_purge_fraction() -> f64 {
    0.5
}

fn default_interval_secs() -> u64 {
    600
}

fn default_write_retries() -> u32 {
    2
}

fn default_write_backoff_ms() -> u64 {
    100
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            batch_limit: default_batch_limit(),
            max_execution_ms: default_max_execution_ms(),
            cache_capacity: default_cache_capacity(),
            cache_purge_fraction: default_cache_purge_fraction(),
            interval_secs: default_interval_secs(),
            write_retries: default_write_retries(),
            write_backoff_ms: default_write_backoff_ms(),
            virtual_domains: default_rules(),
            sample_seed: None,
        }
    }
}

impl BundlerConfig {
    pub fn max_execution(&self) -> Duration {
        Duration::from_millis(self.max_execution_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn write_backoff(&self) -> Duration {
        Duration::from_millis(self.write_backoff_ms)
    }

    pub fn cache(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.cache_capacity,
            purge_fraction: self.cache_purge_fraction,
        }
    }
}
