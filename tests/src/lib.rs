//! Shared helpers for the bundler integration tests.
//!
//! Everything runs against in-memory stores; no external services needed.

pub mod fixtures;
pub mod mocks;
pub mod setup;
