//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid package id: {0}")]
    InvalidPackageId(String),

    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("invalid package: {0}")]
    InvalidPackage(String),

    #[error("invalid nuspec: {0}")]
    InvalidNuspec(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error means the uploaded archive itself is unusable.
    pub fn is_invalid_package(&self) -> bool {
        matches!(
            self,
            Self::InvalidPackage(_)
                | Self::InvalidNuspec(_)
                | Self::InvalidPackageId(_)
                | Self::InvalidVersion(_)
        )
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
