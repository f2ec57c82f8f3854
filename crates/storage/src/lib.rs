//! Blob storage for keg.
//!
//! This crate provides:
//! - The `ObjectStore` abstraction with atomic writes
//! - A local filesystem backend
//! - `PackageStorage`, which lays package blobs out by identity

pub mod backends;
pub mod error;
pub mod package;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use package::{PackageFile, PackageStorage, package_key};
pub use traits::{ByteStream, ObjectStore};

use keg_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
