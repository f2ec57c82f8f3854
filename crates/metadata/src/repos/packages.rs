//! Package repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use keg_core::{NuGetVersion, Package, PackageId};

/// Outcome of inserting a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageAddResult {
    Success,
    /// A package with the same id and normalized version is already stored.
    AlreadyExists,
}

/// Authoritative store of package metadata.
///
/// Ids compare case-insensitively. Versions compare by normalized form.
#[async_trait]
pub trait PackageDatabase: Send + Sync {
    /// Insert a package with its dependencies, types and frameworks.
    ///
    /// A uniqueness conflict is reported as `AlreadyExists`, never as an error,
    /// and leaves the stored package untouched.
    async fn add_package(&self, package: &Package) -> MetadataResult<PackageAddResult>;

    /// Whether any version of `id` exists, or the given version when one is passed.
    /// Unlisted packages count.
    async fn exists(&self, id: &PackageId, version: Option<&NuGetVersion>) -> MetadataResult<bool>;

    /// All versions of a package, sorted ascending by version.
    async fn find_packages(
        &self,
        id: &PackageId,
        include_unlisted: bool,
    ) -> MetadataResult<Vec<Package>>;

    async fn find_package(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        include_unlisted: bool,
    ) -> MetadataResult<Option<Package>>;

    /// Set the listed flag. Returns false when the package does not exist.
    async fn update_listed(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        listed: bool,
    ) -> MetadataResult<bool>;

    /// Add one to the download counter. Returns false when the package does not exist.
    async fn increment_downloads(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
    ) -> MetadataResult<bool>;

    /// Remove the package row and everything hanging off it.
    /// Returns false when the package does not exist.
    async fn hard_delete(&self, id: &PackageId, version: &NuGetVersion) -> MetadataResult<bool>;
}
