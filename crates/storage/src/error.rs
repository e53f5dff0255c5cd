//! Storage error type.

use thiserror::Error;

/// Result type alias using our StorageError type.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    /// A backend call failed; `op` is the facade operation.
    #[error("{op} {key}: {message}")]
    Backend {
        op: &'static str,
        key: String,
        message: String,
    },
}

impl StorageError {
    pub fn backend(op: &'static str, key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            op,
            key: key.into(),
            message: err.to_string(),
        }
    }
}
