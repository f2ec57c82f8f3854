//! Repository traits for metadata operations.

pub mod packages;
pub mod search;

pub use packages::{PackageAddResult, PackageDatabase};
pub use search::{
    SearchIndexer, SearchRequest, SearchResponse, SearchResult, SearchService, SearchVersion,
};
