//! Package indexing pipeline.
//!
//! A pushed or mirrored package goes through five stages in order:
//!
//! 1. parse: open the archive and read its nuspec
//! 2. uniqueness: reject or replace an existing identity
//! 3. storage: write the nupkg, nuspec, readme and icon blobs
//! 4. metadata: insert the package row
//! 5. search: project the package into the search index
//!
//! The first stage to return a terminal outcome ends the run. Storage is
//! written before metadata and metadata before search, so a package is never
//! searchable before it can be fetched. The unique index on the metadata
//! store decides races between concurrent pushes of one identity.

use crate::deletion::hard_delete_package;
use crate::metrics::{INDEXING_DURATION, PACKAGES_INDEXED};
use async_trait::async_trait;
use bytes::Bytes;
use keg_core::{Package, PackageArchive};
use keg_metadata::{PackageAddResult, PackageDatabase, SearchIndexer};
use keg_storage::PackageStorage;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of indexing one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexingResult {
    /// The archive or its manifest could not be read.
    InvalidPackage,
    /// The identity is taken and overwrites are disabled, or a concurrent push won.
    PackageAlreadyExists,
    /// A storage, metadata or search call failed, or the run was cancelled.
    UnexpectedError { message: String },
    Success,
}

impl IndexingResult {
    /// Label used in metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPackage => "invalid_package",
            Self::PackageAlreadyExists => "already_exists",
            Self::UnexpectedError { .. } => "unexpected_error",
            Self::Success => "success",
        }
    }
}

/// State carried through the stages of one indexing run.
pub struct IndexingContext {
    /// Raw `.nupkg` bytes as received.
    pub data: Bytes,
    /// Set by the parse stage.
    pub archive: Option<PackageArchive>,
    pub cancel: CancellationToken,
}

impl IndexingContext {
    pub fn new(data: Bytes, cancel: CancellationToken) -> Self {
        Self {
            data,
            archive: None,
            cancel,
        }
    }

    /// The parsed archive, or an error result if parsing has not run.
    pub fn parsed(&self, stage: &'static str) -> Result<&PackageArchive, IndexingResult> {
        self.archive.as_ref().ok_or_else(|| IndexingResult::UnexpectedError {
            message: format!("{stage} stage ran before the package was parsed"),
        })
    }
}

/// What a stage tells the driver.
#[derive(Debug, PartialEq, Eq)]
pub enum StageOutcome {
    Continue,
    Done(IndexingResult),
}

/// One step of the pipeline.
#[async_trait]
pub trait IndexingStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut IndexingContext) -> StageOutcome;
}

fn cancelled(stage: &'static str) -> IndexingResult {
    tracing::warn!(stage, "Indexing cancelled");
    IndexingResult::UnexpectedError {
        message: format!("cancelled during {stage} stage"),
    }
}

fn unexpected(stage: &'static str, package: &Package, error: impl Display) -> IndexingResult {
    tracing::error!(
        package_id = %package.id,
        version = %package.version,
        stage,
        error = %error,
        "Indexing failed"
    );
    IndexingResult::UnexpectedError {
        message: format!("{stage} stage failed: {error}"),
    }
}

/// Await `fut` unless the run is cancelled first.
async fn or_cancelled<F: Future>(
    cancel: &CancellationToken,
    stage: &'static str,
    fut: F,
) -> Result<F::Output, IndexingResult> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled(stage)),
        output = fut => Ok(output),
    }
}

/// Opens the archive off the async runtime.
pub struct ParseStage;

#[async_trait]
impl IndexingStage for ParseStage {
    fn name(&self) -> &'static str {
        "parse"
    }

    async fn run(&self, ctx: &mut IndexingContext) -> StageOutcome {
        let data = ctx.data.clone();
        let joined = match or_cancelled(
            &ctx.cancel,
            self.name(),
            tokio::task::spawn_blocking(move || PackageArchive::open(&data)),
        )
        .await
        {
            Ok(joined) => joined,
            Err(result) => return StageOutcome::Done(result),
        };

        match joined {
            Ok(Ok(archive)) => {
                ctx.archive = Some(archive);
                StageOutcome::Continue
            }
            Ok(Err(e)) if e.is_invalid_package() => {
                tracing::info!(error = %e, "Rejected invalid package");
                StageOutcome::Done(IndexingResult::InvalidPackage)
            }
            Ok(Err(e)) => StageOutcome::Done(IndexingResult::UnexpectedError {
                message: format!("parse stage failed: {e}"),
            }),
            Err(e) => StageOutcome::Done(IndexingResult::UnexpectedError {
                message: format!("parse stage failed: {e}"),
            }),
        }
    }
}

/// Rejects known identities, or removes them first when overwrites are allowed.
pub struct UniquenessStage {
    database: Arc<dyn PackageDatabase>,
    storage: PackageStorage,
    allow_overwrites: bool,
}

impl UniquenessStage {
    async fn check(&self, ctx: &IndexingContext) -> Result<StageOutcome, IndexingResult> {
        let stage = self.name();
        let package = &ctx.parsed(stage)?.package;

        let exists = or_cancelled(
            &ctx.cancel,
            stage,
            self.database.exists(&package.id, Some(&package.version)),
        )
        .await?
        .map_err(|e| unexpected(stage, package, e))?;

        if !exists {
            return Ok(StageOutcome::Continue);
        }
        if !self.allow_overwrites {
            tracing::info!(
                package_id = %package.id,
                version = %package.version,
                "Package already exists"
            );
            return Ok(StageOutcome::Done(IndexingResult::PackageAlreadyExists));
        }

        tracing::info!(
            package_id = %package.id,
            version = %package.version,
            "Replacing existing package"
        );
        or_cancelled(
            &ctx.cancel,
            stage,
            hard_delete_package(
                self.database.as_ref(),
                &self.storage,
                &package.id,
                &package.version,
            ),
        )
        .await?
        .map_err(|e| unexpected(stage, package, e))?;
        Ok(StageOutcome::Continue)
    }
}

#[async_trait]
impl IndexingStage for UniquenessStage {
    fn name(&self) -> &'static str {
        "uniqueness"
    }

    async fn run(&self, ctx: &mut IndexingContext) -> StageOutcome {
        self.check(ctx).await.unwrap_or_else(StageOutcome::Done)
    }
}

/// Writes the package blobs.
pub struct StorageStage {
    storage: PackageStorage,
}

impl StorageStage {
    async fn save(&self, ctx: &IndexingContext) -> Result<StageOutcome, IndexingResult> {
        let stage = self.name();
        let archive = ctx.parsed(stage)?;
        let package = &archive.package;

        or_cancelled(
            &ctx.cancel,
            stage,
            self.storage.save_package_content(
                &package.id,
                &package.version,
                ctx.data.clone(),
                archive.nuspec.clone(),
                archive.readme.clone(),
                archive.icon.clone(),
            ),
        )
        .await?
        .map_err(|e| unexpected(stage, package, e))?;
        Ok(StageOutcome::Continue)
    }
}

#[async_trait]
impl IndexingStage for StorageStage {
    fn name(&self) -> &'static str {
        "storage"
    }

    async fn run(&self, ctx: &mut IndexingContext) -> StageOutcome {
        self.save(ctx).await.unwrap_or_else(StageOutcome::Done)
    }
}

/// Inserts the package row. A unique violation here means a concurrent push won.
pub struct MetadataStage {
    database: Arc<dyn PackageDatabase>,
}

impl MetadataStage {
    async fn insert(&self, ctx: &IndexingContext) -> Result<StageOutcome, IndexingResult> {
        let stage = self.name();
        let package = &ctx.parsed(stage)?.package;

        let added = or_cancelled(&ctx.cancel, stage, self.database.add_package(package))
            .await?
            .map_err(|e| unexpected(stage, package, e))?;

        match added {
            PackageAddResult::Success => Ok(StageOutcome::Continue),
            PackageAddResult::AlreadyExists => {
                tracing::info!(
                    package_id = %package.id,
                    version = %package.version,
                    "Package was added by a concurrent push"
                );
                Ok(StageOutcome::Done(IndexingResult::PackageAlreadyExists))
            }
        }
    }
}

#[async_trait]
impl IndexingStage for MetadataStage {
    fn name(&self) -> &'static str {
        "metadata"
    }

    async fn run(&self, ctx: &mut IndexingContext) -> StageOutcome {
        self.insert(ctx).await.unwrap_or_else(StageOutcome::Done)
    }
}

/// Makes the stored package searchable.
pub struct SearchStage {
    search: Arc<dyn SearchIndexer>,
}

impl SearchStage {
    async fn project(&self, ctx: &IndexingContext) -> Result<StageOutcome, IndexingResult> {
        let stage = self.name();
        let package = &ctx.parsed(stage)?.package;

        or_cancelled(&ctx.cancel, stage, self.search.index(package))
            .await?
            .map_err(|e| unexpected(stage, package, e))?;
        Ok(StageOutcome::Continue)
    }
}

#[async_trait]
impl IndexingStage for SearchStage {
    fn name(&self) -> &'static str {
        "search"
    }

    async fn run(&self, ctx: &mut IndexingContext) -> StageOutcome {
        self.project(ctx).await.unwrap_or_else(StageOutcome::Done)
    }
}

/// Runs stages in order and stops at the first terminal outcome.
pub struct IndexingPipeline {
    stages: Vec<Box<dyn IndexingStage>>,
}

impl IndexingPipeline {
    /// The standard parse, uniqueness, storage, metadata, search pipeline.
    pub fn new(
        storage: PackageStorage,
        database: Arc<dyn PackageDatabase>,
        search: Arc<dyn SearchIndexer>,
        allow_overwrites: bool,
    ) -> Self {
        Self::from_stages(vec![
            Box::new(ParseStage),
            Box::new(UniquenessStage {
                database: database.clone(),
                storage: storage.clone(),
                allow_overwrites,
            }),
            Box::new(StorageStage { storage }),
            Box::new(MetadataStage { database }),
            Box::new(SearchStage { search }),
        ])
    }

    pub fn from_stages(stages: Vec<Box<dyn IndexingStage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Index one package. Errors are reported through the result, never raised.
    pub async fn index(&self, data: Bytes, cancel: &CancellationToken) -> IndexingResult {
        let timer = INDEXING_DURATION.start_timer();
        let mut ctx = IndexingContext::new(data, cancel.clone());

        let result = self.drive(&mut ctx).await;

        timer.observe_duration();
        PACKAGES_INDEXED.with_label_values(&[result.as_str()]).inc();
        if result == IndexingResult::Success
            && let Some(archive) = &ctx.archive
        {
            tracing::info!(
                package_id = %archive.package.id,
                version = %archive.package.version,
                "Package indexed"
            );
        }
        result
    }

    async fn drive(&self, ctx: &mut IndexingContext) -> IndexingResult {
        for stage in &self.stages {
            if ctx.cancel.is_cancelled() {
                return cancelled(stage.name());
            }
            tracing::debug!(stage = stage.name(), "Running indexing stage");
            if let StageOutcome::Done(result) = stage.run(ctx).await {
                return result;
            }
        }
        IndexingResult::Success
    }
}
