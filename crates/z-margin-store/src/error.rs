//! Error types for z-margin storage.

use z_margin_core::MarginError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("not found")]
    NotFound,
}

impl From<StoreError> for MarginError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Serialization(msg) => Self::Serialization(msg),
            StoreError::Database(msg) => Self::Storage(msg),
            StoreError::NotFound => Self::Storage("record not found".to_string()),
        }
    }
}
