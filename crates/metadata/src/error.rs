//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        MetadataError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for MetadataError {
    fn from(e: serde_json::Error) -> Self {
        MetadataError::CorruptRow(e.to_string())
    }
}

impl From<keg_core::Error> for MetadataError {
    fn from(e: keg_core::Error) -> Self {
        MetadataError::CorruptRow(e.to_string())
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
