//! RUM session bundler.
//!
//! Turns raw event logs into per-session bundles stored in hourly groups:
//! - Resource cache (memoized, dirty-aware LRU for manifests and groups)
//! - Session router (first-hour session continuity, midnight lookback)
//! - Virtual domain router (relabel, sample, collapse)
//! - Batch driver (lock, list, process, flush, archive, budget)
//! - Scheduler (periodic runs)

pub mod batch;
pub mod budget;
pub mod cache;
pub mod config;
pub mod context;
pub mod decode;
pub mod driver;
pub mod enrichment;
pub mod error;
pub mod queue;
pub mod router;
pub mod scheduler;
pub mod virtual_domains;

pub use cache::{CacheConfig, Evictable, ResourceCache};
pub use config::BundlerConfig;
pub use context::BundleContext;
pub use driver::*;
pub use enrichment::UserAgentClassifier;
pub use error::{BundleError, Result};
pub use router::SessionRouter;
pub use scheduler::BundlerScheduler;
pub use virtual_domains::{VirtualRoute, VirtualRouter, VirtualRule, VirtualRuleConfig};
