//! Telemetry for the RUM bundler.
//!
//! Structured logs through `tracing`, plus a process-wide registry of
//! counters that each run reports into and that is logged as a snapshot.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::*;
pub use tracing_setup::*;
