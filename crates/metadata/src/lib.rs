//! Package metadata for keg.
//!
//! This crate provides:
//! - `PackageDatabase`, the authoritative record of which packages exist
//! - `SearchIndexer` and `SearchService` over a search projection
//! - A SQLite implementation of both

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use repos::{
    PackageAddResult, PackageDatabase, SearchIndexer, SearchRequest, SearchResponse, SearchResult,
    SearchService, SearchVersion,
};
pub use store::{MetadataStore, SqliteStore};

use keg_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
