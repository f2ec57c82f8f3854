//! Package content storage on top of an object store.
//!
//! Layout, all lowercase:
//!
//! ```text
//! packages/{id}/{version}/{id}.{version}.nupkg
//! packages/{id}/{version}/{id}.nuspec
//! packages/{id}/{version}/readme
//! packages/{id}/{version}/icon
//! ```

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectStore};
use bytes::Bytes;
use keg_core::{NuGetVersion, PackageId};
use std::sync::Arc;
use tracing::instrument;

const PACKAGES_PREFIX: &str = "packages";

/// Stores the nupkg, nuspec, readme and icon blobs of each package version.
#[derive(Clone)]
pub struct PackageStorage {
    store: Arc<dyn ObjectStore>,
}

/// Blob kinds kept per package version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFile {
    Package,
    Nuspec,
    Readme,
    Icon,
}

impl PackageFile {
    pub const ALL: [PackageFile; 4] = [Self::Package, Self::Nuspec, Self::Readme, Self::Icon];
}

/// Directory holding every blob of one package version.
pub fn package_dir(id: &PackageId, version: &NuGetVersion) -> String {
    format!("{PACKAGES_PREFIX}/{}/{}", id.lower(), version.lower())
}

/// Storage key of one blob.
pub fn package_key(id: &PackageId, version: &NuGetVersion, file: PackageFile) -> String {
    let dir = package_dir(id, version);
    let id = id.lower();
    match file {
        PackageFile::Package => format!("{dir}/{id}.{}.nupkg", version.lower()),
        PackageFile::Nuspec => format!("{dir}/{id}.nuspec"),
        PackageFile::Readme => format!("{dir}/readme"),
        PackageFile::Icon => format!("{dir}/icon"),
    }
}

impl PackageStorage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// The underlying object store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Write all blobs for a package version.
    ///
    /// Blobs are written one at a time; a failure part way through can leave
    /// earlier blobs in place. They are unreachable until metadata exists and
    /// are replaced or removed by the next write or delete of the same identity.
    #[instrument(skip_all, fields(package_id = %id, version = %version))]
    pub async fn save_package_content(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        package: Bytes,
        nuspec: Bytes,
        readme: Option<Bytes>,
        icon: Option<Bytes>,
    ) -> StorageResult<()> {
        self.store
            .put(&package_key(id, version, PackageFile::Package), package)
            .await?;
        self.store
            .put(&package_key(id, version, PackageFile::Nuspec), nuspec)
            .await?;
        if let Some(readme) = readme {
            self.store
                .put(&package_key(id, version, PackageFile::Readme), readme)
                .await?;
        }
        if let Some(icon) = icon {
            self.store
                .put(&package_key(id, version, PackageFile::Icon), icon)
                .await?;
        }
        Ok(())
    }

    /// Open a blob, `None` when it is absent.
    pub async fn get_stream(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        file: PackageFile,
    ) -> StorageResult<Option<ByteStream>> {
        match self.store.get_stream(&package_key(id, version, file)).await {
            Ok(stream) => Ok(Some(stream)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read a whole blob, `None` when it is absent.
    pub async fn get_bytes(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        file: PackageFile,
    ) -> StorageResult<Option<Bytes>> {
        match self.store.get(&package_key(id, version, file)).await {
            Ok(data) => Ok(Some(data)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_package_stream(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
    ) -> StorageResult<Option<ByteStream>> {
        self.get_stream(id, version, PackageFile::Package).await
    }

    pub async fn get_nuspec_stream(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
    ) -> StorageResult<Option<ByteStream>> {
        self.get_stream(id, version, PackageFile::Nuspec).await
    }

    pub async fn get_readme_stream(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
    ) -> StorageResult<Option<ByteStream>> {
        self.get_stream(id, version, PackageFile::Readme).await
    }

    pub async fn get_icon_stream(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
    ) -> StorageResult<Option<ByteStream>> {
        self.get_stream(id, version, PackageFile::Icon).await
    }

    /// Remove every blob of a package version. Missing blobs are not an error.
    #[instrument(skip(self), fields(package_id = %id, version = %version))]
    pub async fn delete(&self, id: &PackageId, version: &NuGetVersion) -> StorageResult<()> {
        for file in PackageFile::ALL {
            match self.store.delete(&package_key(id, version, file)).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
