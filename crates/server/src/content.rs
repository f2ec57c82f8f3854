//! Read-side services for package content and registration metadata.
//!
//! Both consult the mirror before answering, so a configured upstream makes
//! the local feed behave as a read-through cache.

use crate::error::ServiceError;
use crate::mirror::MirrorService;
use keg_core::{NuGetVersion, Package, PackageId};
use keg_metadata::PackageDatabase;
use keg_storage::{ByteStream, PackageFile, PackageStorage};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Serves package versions and package files.
pub struct PackageContentService {
    database: Arc<dyn PackageDatabase>,
    storage: PackageStorage,
    mirror: Arc<MirrorService>,
}

impl PackageContentService {
    pub fn new(
        database: Arc<dyn PackageDatabase>,
        storage: PackageStorage,
        mirror: Arc<MirrorService>,
    ) -> Self {
        Self {
            database,
            storage,
            mirror,
        }
    }

    /// Local versions, unlisted included, merged with upstream versions.
    /// Distinct and ascending.
    pub async fn get_versions(
        &self,
        id: &PackageId,
        cancel: &CancellationToken,
    ) -> Result<Vec<NuGetVersion>, ServiceError> {
        let local = self.database.find_packages(id, true).await?;
        let mut versions: BTreeSet<NuGetVersion> = local.into_iter().map(|p| p.version).collect();
        if let Some(upstream) = self.mirror.find_package_versions(id, cancel).await {
            versions.extend(upstream);
        }
        Ok(versions.into_iter().collect())
    }

    /// The `.nupkg` stream. Counts a download when the package exists.
    pub async fn get_package_content(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        cancel: &CancellationToken,
    ) -> Result<Option<ByteStream>, ServiceError> {
        self.mirror.mirror(id, version, cancel).await;

        if !self.database.increment_downloads(id, version).await? {
            return Ok(None);
        }
        Ok(self.storage.get_package_stream(id, version).await?)
    }

    pub async fn get_nuspec(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        cancel: &CancellationToken,
    ) -> Result<Option<ByteStream>, ServiceError> {
        self.get_file(id, version, PackageFile::Nuspec, cancel).await
    }

    pub async fn get_readme(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        cancel: &CancellationToken,
    ) -> Result<Option<ByteStream>, ServiceError> {
        self.get_file(id, version, PackageFile::Readme, cancel).await
    }

    pub async fn get_icon(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        cancel: &CancellationToken,
    ) -> Result<Option<ByteStream>, ServiceError> {
        self.get_file(id, version, PackageFile::Icon, cancel).await
    }

    async fn get_file(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        file: PackageFile,
        cancel: &CancellationToken,
    ) -> Result<Option<ByteStream>, ServiceError> {
        self.mirror.mirror(id, version, cancel).await;

        // Blobs without a metadata row are leftovers of a failed push.
        if !self.database.exists(id, Some(version)).await? {
            return Ok(None);
        }
        Ok(self.storage.get_stream(id, version, file).await?)
    }
}

/// Serves registration metadata.
pub struct PackageMetadataService {
    mirror: Arc<MirrorService>,
}

impl PackageMetadataService {
    pub fn new(mirror: Arc<MirrorService>) -> Self {
        Self { mirror }
    }

    /// Every known version of `id`, local and upstream. `None` when there are none.
    pub async fn find_registration(
        &self,
        id: &PackageId,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<Package>>, ServiceError> {
        let packages = self.mirror.find_packages(id, cancel).await?;
        Ok((!packages.is_empty()).then_some(packages))
    }
}
