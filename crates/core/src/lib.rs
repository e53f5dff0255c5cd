//! Core types for the RUM bundler: raw events, bundles, manifests, and the
//! partition/session keys that address them in storage.

pub mod aggregate;
pub mod bundle;
pub mod error;
pub mod events;
pub mod limits;
pub mod manifest;
pub mod partition;

pub use aggregate::{Aggregate, AggregateData};
pub use bundle::*;
pub use error::{Error, Result};
pub use events::*;
pub use manifest::*;
pub use partition::*;
