//! Wall-clock budget of a run.
//!
//! A run may only start another iteration if, judging by the average of the
//! iterations so far, that iteration would end inside the budget.

use std::time::{Duration, Instant};

use crate::error::{BundleError, Result};

#[derive(Debug, Clone)]
pub struct ExecutionBudget {
    limit: Duration,
    started: Instant,
    iterations: u32,
    spent: Duration,
}

impl ExecutionBudget {
    pub fn start(limit: Duration) -> Self {
        Self {
            limit,
            started: Instant::now(),
            iterations: 0,
            spent: Duration::ZERO,
        }
    }

    pub fn record(&mut self, took: Duration) {
        self.iterations += 1;
        self.spent += took;
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn average(&self) -> Option<Duration> {
        (self.iterations > 0).then(|| self.spent / self.iterations)
    }

    /// Errors with `BudgetExceeded` if the next iteration is projected to
    /// overrun. The first iteration is always allowed.
    pub fn ensure_next(&self) -> Result<()> {
        self.check_at(self.elapsed())
    }

    fn check_at(&self, elapsed: Duration) -> Result<()> {
        let Some(average) = self.average() else {
            return Ok(());
        };
        let projected = elapsed + average;
        if projected <= self.limit {
            return Ok(());
        }
        Err(BundleError::BudgetExceeded {
            iterations: self.iterations,
            elapsed_ms: elapsed.as_millis() as u64,
            projected_ms: projected.as_millis() as u64,
            limit_ms: self.limit.as_millis() as u64,
        })
    }
}
