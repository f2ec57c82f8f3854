//! Fault-injecting store wrappers.

use async_trait::async_trait;
use bytes::Bytes;
use keg_core::{NuGetVersion, Package, PackageId};
use keg_metadata::{
    MetadataError, MetadataResult, MetadataStore, PackageAddResult, PackageDatabase, SearchIndexer,
};
use keg_storage::{ByteStream, ObjectStore, StorageError, StorageResult};
use std::sync::Arc;
use std::time::Duration;

/// Object store whose writes or deletes fail or stall. Reads go to the inner store.
#[allow(dead_code)]
pub struct FaultyStore {
    pub inner: Arc<dyn ObjectStore>,
    pub fail_puts: bool,
    pub fail_deletes: bool,
    pub put_delay: Option<Duration>,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn failing(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            fail_puts: true,
            fail_deletes: false,
            put_delay: None,
        }
    }

    pub fn failing_deletes(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            fail_puts: false,
            fail_deletes: true,
            put_delay: None,
        }
    }

    pub fn slow(inner: Arc<dyn ObjectStore>, delay: Duration) -> Self {
        Self {
            inner,
            fail_puts: false,
            fail_deletes: false,
            put_delay: Some(delay),
        }
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_puts {
            return Err(StorageError::Io(std::io::Error::other("disk on fire")));
        }
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.fail_deletes {
            return Err(StorageError::Io(std::io::Error::other("read-only filesystem")));
        }
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}

/// Package database whose inserts fail.
#[allow(dead_code)]
pub struct FailingDatabase {
    pub inner: Arc<dyn MetadataStore>,
}

#[async_trait]
impl PackageDatabase for FailingDatabase {
    async fn add_package(&self, _package: &Package) -> MetadataResult<PackageAddResult> {
        Err(MetadataError::Internal("database unavailable".to_string()))
    }

    async fn exists(&self, id: &PackageId, version: Option<&NuGetVersion>) -> MetadataResult<bool> {
        self.inner.exists(id, version).await
    }

    async fn find_packages(
        &self,
        id: &PackageId,
        include_unlisted: bool,
    ) -> MetadataResult<Vec<Package>> {
        self.inner.find_packages(id, include_unlisted).await
    }

    async fn find_package(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        include_unlisted: bool,
    ) -> MetadataResult<Option<Package>> {
        self.inner.find_package(id, version, include_unlisted).await
    }

    async fn update_listed(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        listed: bool,
    ) -> MetadataResult<bool> {
        self.inner.update_listed(id, version, listed).await
    }

    async fn increment_downloads(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
    ) -> MetadataResult<bool> {
        self.inner.increment_downloads(id, version).await
    }

    async fn hard_delete(&self, id: &PackageId, version: &NuGetVersion) -> MetadataResult<bool> {
        self.inner.hard_delete(id, version).await
    }
}

/// Search indexer that always fails.
#[allow(dead_code)]
pub struct FailingIndexer;

#[async_trait]
impl SearchIndexer for FailingIndexer {
    async fn index(&self, _package: &Package) -> MetadataResult<()> {
        Err(MetadataError::Internal("search unavailable".to_string()))
    }
}
