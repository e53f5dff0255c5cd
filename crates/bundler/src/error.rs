//! Errors surfaced by a bundling run.
//!
//! Only `Conflict` and `BudgetExceeded` are meant to reach the caller of a
//! run as distinct outcomes. Item-level failures (bad lines, bad URLs,
//! single failed writes) are logged and counted, never returned.

use rum_storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BundleError>;

#[derive(Debug, Error)]
pub enum BundleError {
    /// Another run holds the lock marker. Retry later, not immediately.
    #[error("bundling already in progress: lock {0} is held")]
    Conflict(String),

    /// The next iteration would not finish inside the execution budget.
    /// Iterations completed before this point are already flushed.
    #[error(
        "execution budget exceeded after {iterations} iterations: \
         {elapsed_ms}ms elapsed, next iteration projected to end at {projected_ms}ms \
         (limit {limit_ms}ms)"
    )]
    BudgetExceeded {
        iterations: u32,
        elapsed_ms: u64,
        projected_ms: u64,
        limit_ms: u64,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] rum_core::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BundleError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, Self::BudgetExceeded { .. })
    }
}
