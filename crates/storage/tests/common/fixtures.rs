//! Shared fixtures for storage integration tests.

use bytes::Bytes;
use futures::TryStreamExt;
use keg_core::{NuGetVersion, PackageId};
use keg_storage::{ByteStream, FilesystemBackend, PackageStorage};
use std::sync::Arc;
use tempfile::TempDir;

/// Package storage over a fresh temporary directory.
pub async fn temp_storage() -> (TempDir, PackageStorage) {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = FilesystemBackend::new(dir.path())
        .await
        .expect("filesystem backend");
    (dir, PackageStorage::new(Arc::new(backend)))
}

pub fn identity(id: &str, version: &str) -> (PackageId, NuGetVersion) {
    (
        PackageId::new(id).expect("valid id"),
        NuGetVersion::parse(version).expect("valid version"),
    )
}

/// Drain a stream into one buffer.
#[allow(dead_code)]
pub async fn collect(stream: ByteStream) -> Bytes {
    let chunks: Vec<Bytes> = stream.try_collect().await.expect("stream");
    Bytes::from(chunks.concat())
}
