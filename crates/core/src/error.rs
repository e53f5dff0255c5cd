//! Unified error type for the bundler core.
//!
//! Every variant here is an item-level failure: the caller logs it, counts
//! it and moves on to the next event or line.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_url(msg: impl Into<String>) -> Self {
        Self::InvalidUrl(msg.into())
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Short machine-readable label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InvalidUrl(_) => "invalid_url",
            Self::InvalidTimestamp(_) => "invalid_timestamp",
            Self::MissingField(_) => "missing_field",
            Self::Serialization(_) => "serialization",
        }
    }
}
