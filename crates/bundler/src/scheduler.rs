//! Periodic bundling runs for `serve` mode.

use std::sync::Arc;
use std::time::Duration;

use telemetry::metrics;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::driver::{BatchDriver, BatchReport};
use crate::error::{BundleError, Result};

/// Runs the batch driver on a fixed interval.
pub struct BundlerScheduler {
    driver: Arc<BatchDriver>,
    interval: Duration,
}

impl BundlerScheduler {
    pub fn new(driver: Arc<BatchDriver>) -> Self {
        let interval = driver.config().interval();
        Self { driver, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawns the run loop. The first run starts immediately.
    ///
    /// Cancelling `shutdown` stops the loop between runs: a run in
    /// progress finishes and releases its lock before the task ends.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        info!(interval_secs = self.interval.as_secs(), "Bundler scheduler started");
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let _ = self.run_once().await;
                metrics().log_snapshot();
            }
            info!("Bundler scheduler stopped");
        })
    }

    /// One run, logged by outcome. A conflict or an early stop is routine
    /// here: the next tick picks up where this one left off.
    pub async fn run_once(&self) -> Result<BatchReport> {
        let outcome = self.driver.run().await;
        match &outcome {
            Ok(report) => info!(
                run_id = %report.run_id,
                files = report.files_processed,
                "Scheduled bundling run complete"
            ),
            Err(BundleError::Conflict(key)) => {
                warn!(lock = %key, "Previous bundling run still active, skipping tick")
            }
            Err(e @ BundleError::BudgetExceeded { .. }) => {
                warn!(error = %e, "Scheduled run hit its budget, resuming next tick")
            }
            Err(e) => error!(error = %e, "Scheduled bundling run failed"),
        }
        outcome
    }
}
