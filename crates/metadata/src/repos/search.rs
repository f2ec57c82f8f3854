//! Search projection and queries.

use crate::error::MetadataResult;
use async_trait::async_trait;
use keg_core::{NuGetVersion, Package, PackageId};

/// Maintains the search projection.
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    /// Insert or refresh the projection row for a stored package.
    /// Returns `NotFound` if the package row does not exist.
    async fn index(&self, package: &Package) -> MetadataResult<()>;
}

/// Search query parameters.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Whitespace separated terms, all of which must match. Empty matches everything.
    pub query: String,
    pub skip: usize,
    pub take: usize,
    pub include_prerelease: bool,
    pub include_semver2: bool,
    /// Only packages declaring this type, case-insensitive.
    pub package_type: Option<String>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            skip: 0,
            take: 20,
            include_prerelease: false,
            include_semver2: false,
            package_type: None,
        }
    }
}

/// One matching version of a search result.
#[derive(Debug, Clone)]
pub struct SearchVersion {
    pub version: NuGetVersion,
    pub downloads: i64,
}

/// One package id in a search response.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: PackageId,
    /// Highest matching version, with full metadata.
    pub latest: Package,
    /// Every matching version, ascending.
    pub versions: Vec<SearchVersion>,
    pub total_downloads: i64,
}

/// A page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    /// Matching package ids before paging.
    pub total_hits: usize,
    pub data: Vec<SearchResult>,
}

/// Queries over the search projection. Only listed, indexed packages are returned.
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Results are grouped by package id and ordered by total downloads, then id.
    async fn search(&self, request: &SearchRequest) -> MetadataResult<SearchResponse>;

    /// Package ids containing `query`, ordered by id.
    async fn autocomplete(
        &self,
        query: &str,
        skip: usize,
        take: usize,
    ) -> MetadataResult<Vec<String>>;
}
