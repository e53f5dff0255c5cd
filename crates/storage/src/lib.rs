//! Object store facade for the RUM bundler.
//!
//! The bundler only ever talks to `dyn ObjectStore`; backends are an
//! in-memory map, S3, and a mirroring wrapper over any two of them.

pub mod config;
pub mod error;
pub mod memory;
pub mod mirror;
pub mod s3;
pub mod store;

pub use config::*;
pub use error::{Result, StorageError};
pub use memory::MemoryStore;
pub use mirror::MirroredStore;
pub use s3::S3Store;
pub use store::*;
