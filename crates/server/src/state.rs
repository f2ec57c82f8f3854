//! Application state shared across handlers.

use crate::content::{PackageContentService, PackageMetadataService};
use crate::deletion::DeletionService;
use crate::indexing::IndexingPipeline;
use crate::mirror::{MirrorClient, MirrorService, client_from_config};
use anyhow::Context;
use keg_core::config::AppConfig;
use keg_metadata::{MetadataStore, PackageDatabase, SearchIndexer};
use keg_storage::{ObjectStore, PackageStorage};
use std::sync::Arc;

/// Application state.
///
/// Services are built once from the validated configuration and shared by
/// every request.
#[derive(Clone)]
pub struct AppState {
    /// Immutable after startup.
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ObjectStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub storage: PackageStorage,
    pub pipeline: Arc<IndexingPipeline>,
    pub mirror: Arc<MirrorService>,
    pub deletion: Arc<DeletionService>,
    pub content: Arc<PackageContentService>,
    pub registrations: Arc<PackageMetadataService>,
}

impl AppState {
    /// Build the state, creating the upstream client from `config.mirror`.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> anyhow::Result<Self> {
        let client = client_from_config(&config.mirror, config.server.max_package_size_bytes)
            .context("invalid mirror configuration")?;
        Self::with_mirror_client(config, store, metadata, client)
    }

    /// Build the state around an explicit upstream client.
    pub fn with_mirror_client(
        config: AppConfig,
        store: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        client: Option<Arc<dyn MirrorClient>>,
    ) -> anyhow::Result<Self> {
        let storage = PackageStorage::new(store.clone());
        let database: Arc<dyn PackageDatabase> = metadata.clone();
        let search: Arc<dyn SearchIndexer> = metadata.clone();

        let pipeline = Arc::new(IndexingPipeline::new(
            storage.clone(),
            database.clone(),
            search,
            config.server.allow_package_overwrites,
        ));
        let mirror = Arc::new(MirrorService::new(
            client,
            database.clone(),
            pipeline.clone(),
        ));
        let deletion = DeletionService::new(&config.deletion, database.clone(), storage.clone())
            .context("invalid deletion.hard_delete_allow_pattern")?;
        let content = PackageContentService::new(database, storage.clone(), mirror.clone());
        let registrations = PackageMetadataService::new(mirror.clone());

        if mirror.is_enabled() {
            tracing::info!(
                source = %config.mirror.package_source,
                legacy = config.mirror.legacy,
                "Upstream mirroring enabled"
            );
        }

        Ok(Self {
            config: Arc::new(config),
            store,
            metadata,
            storage,
            pipeline,
            mirror,
            deletion: Arc::new(deletion),
            content: Arc::new(content),
            registrations: Arc::new(registrations),
        })
    }
}
