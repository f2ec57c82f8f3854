//! Read-through mirroring of an upstream feed.
//!
//! When a package is missing locally, `MirrorService` downloads it from the
//! upstream feed and runs it through the indexing pipeline like a push.
//! Upstream failures never fail the caller's request: they are logged at
//! warn level and treated as "no upstream data".

pub mod v2;
pub mod v3;

pub use v2::V2MirrorClient;
pub use v3::V3MirrorClient;

use crate::indexing::{IndexingPipeline, IndexingResult};
use crate::metrics::{MIRROR_DOWNLOADS, record_upstream_error};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use keg_core::config::MirrorConfig;
use keg_core::{NuGetVersion, Package, PackageId};
use keg_metadata::{MetadataResult, PackageDatabase};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Upstream feed errors.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream request cancelled")]
    Cancelled,

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
}

/// Client for an upstream feed.
#[async_trait]
pub trait MirrorClient: Send + Sync {
    /// Every version the upstream has for `id`. Empty when it has none.
    async fn list_versions(
        &self,
        id: &PackageId,
        cancel: &CancellationToken,
    ) -> Result<Vec<NuGetVersion>, MirrorError>;

    /// Upstream metadata for every version of `id`.
    async fn list_metadata(
        &self,
        id: &PackageId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>, MirrorError>;

    /// The `.nupkg` bytes, `None` when the upstream does not have the package.
    async fn download_package(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>, MirrorError>;
}

/// Build the configured upstream client, `None` when mirroring is disabled.
///
/// Upstream response bodies larger than `max_body_bytes` are rejected.
pub fn client_from_config(
    config: &MirrorConfig,
    max_body_bytes: usize,
) -> Result<Option<Arc<dyn MirrorClient>>, MirrorError> {
    if !config.enabled {
        return Ok(None);
    }
    let upstream = Upstream::new(config.timeout(), max_body_bytes)?;
    let source = Url::parse(&config.package_source)?;
    let client: Arc<dyn MirrorClient> = if config.legacy {
        Arc::new(V2MirrorClient::new(upstream, source))
    } else {
        Arc::new(V3MirrorClient::new(upstream, source))
    };
    Ok(Some(client))
}

/// HTTP access to the upstream with a per-request timeout, a body size cap
/// and cancellation.
#[derive(Clone)]
pub struct Upstream {
    client: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl Upstream {
    pub fn new(timeout: Duration, max_body_bytes: usize) -> Result<Self, MirrorError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("keg/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            timeout,
            max_body_bytes,
        })
    }

    fn too_large(&self, url: &Url) -> MirrorError {
        MirrorError::InvalidResponse(format!("{url}: body exceeds {} bytes", self.max_body_bytes))
    }

    /// Read the body, stopping as soon as it passes `max_body_bytes`.
    async fn read_body(
        &self,
        url: &Url,
        response: reqwest::Response,
    ) -> Result<Bytes, MirrorError> {
        if response
            .content_length()
            .is_some_and(|len| len > self.max_body_bytes as u64)
        {
            return Err(self.too_large(url));
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(self.too_large(url));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(body))
    }

    /// GET a URL. A 404 is `Ok(None)`; any other non-success status is an error.
    pub async fn get_bytes(
        &self,
        url: Url,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>, MirrorError> {
        let request = async {
            let response = self.client.get(url.clone()).send().await?;
            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                return Err(MirrorError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            Ok(Some(self.read_body(&url, response).await?))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MirrorError::Cancelled),
            result = tokio::time::timeout(self.timeout, request) => {
                result.map_err(|_| MirrorError::Timeout(self.timeout))?
            }
        }
    }

    /// GET and decode a JSON document. A 404 is `Ok(None)`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, MirrorError> {
        let Some(body) = self.get_bytes(url.clone(), cancel).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| MirrorError::InvalidResponse(format!("{url}: {e}")))
    }
}

/// What a mirror attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// Mirroring is not configured.
    Disabled,
    /// The package was already stored locally.
    Present,
    /// The package was downloaded and indexed.
    Mirrored,
    /// The upstream does not have the package.
    NotFound,
    /// The upstream or the indexing run failed. Already logged.
    Failed,
}

impl MirrorOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Present => "present",
            Self::Mirrored => "mirrored",
            Self::NotFound => "not_found",
            Self::Failed => "failed",
        }
    }
}

/// Serves the local feed as a read-through cache of the upstream.
pub struct MirrorService {
    client: Option<Arc<dyn MirrorClient>>,
    database: Arc<dyn PackageDatabase>,
    pipeline: Arc<IndexingPipeline>,
}

impl MirrorService {
    pub fn new(
        client: Option<Arc<dyn MirrorClient>>,
        database: Arc<dyn PackageDatabase>,
        pipeline: Arc<IndexingPipeline>,
    ) -> Self {
        Self {
            client,
            database,
            pipeline,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Upstream versions of `id`.
    ///
    /// `None` when mirroring is disabled, the upstream has nothing, or the
    /// upstream failed; callers then list local versions only.
    pub async fn find_package_versions(
        &self,
        id: &PackageId,
        cancel: &CancellationToken,
    ) -> Option<Vec<NuGetVersion>> {
        let client = self.client.as_ref()?;
        match client.list_versions(id, cancel).await {
            Ok(versions) if versions.is_empty() => None,
            Ok(versions) => Some(versions),
            Err(e) => {
                record_upstream_error("list_versions");
                tracing::warn!(package_id = %id, error = %e, "Failed to list upstream versions");
                None
            }
        }
    }

    /// Local packages merged with upstream metadata, one entry per version,
    /// sorted ascending. Local packages win over upstream ones.
    pub async fn find_packages(
        &self,
        id: &PackageId,
        cancel: &CancellationToken,
    ) -> MetadataResult<Vec<Package>> {
        let local = self.database.find_packages(id, true).await?;

        let upstream = match &self.client {
            Some(client) => match client.list_metadata(id, cancel).await {
                Ok(packages) => packages,
                Err(e) => {
                    record_upstream_error("list_metadata");
                    tracing::warn!(
                        package_id = %id,
                        error = %e,
                        "Failed to read upstream metadata"
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut merged: BTreeMap<NuGetVersion, Package> = BTreeMap::new();
        for package in upstream {
            merged.insert(package.version.clone(), package);
        }
        for package in local {
            merged.insert(package.version.clone(), package);
        }
        Ok(merged.into_values().collect())
    }

    /// Fetch and index a package that is missing locally.
    ///
    /// No-op when the package is already stored. Upstream failures are
    /// logged and reported through the outcome, never raised.
    pub async fn mirror(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        cancel: &CancellationToken,
    ) -> MirrorOutcome {
        let outcome = self.try_mirror(id, version, cancel).await;
        if outcome != MirrorOutcome::Disabled {
            MIRROR_DOWNLOADS.with_label_values(&[outcome.as_str()]).inc();
        }
        outcome
    }

    async fn try_mirror(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        cancel: &CancellationToken,
    ) -> MirrorOutcome {
        let Some(client) = &self.client else {
            return MirrorOutcome::Disabled;
        };

        match self.database.exists(id, Some(version)).await {
            Ok(true) => return MirrorOutcome::Present,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    package_id = %id,
                    version = %version,
                    error = %e,
                    "Failed to check local package before mirroring"
                );
                return MirrorOutcome::Failed;
            }
        }

        let data = match client.download_package(id, version, cancel).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(package_id = %id, version = %version, "Package not found upstream");
                return MirrorOutcome::NotFound;
            }
            Err(e) => {
                record_upstream_error("download_package");
                tracing::warn!(
                    package_id = %id,
                    version = %version,
                    error = %e,
                    "Failed to download upstream package"
                );
                return MirrorOutcome::Failed;
            }
        };

        match self.pipeline.index(data, cancel).await {
            IndexingResult::Success => {
                tracing::info!(package_id = %id, version = %version, "Mirrored upstream package");
                MirrorOutcome::Mirrored
            }
            IndexingResult::PackageAlreadyExists => MirrorOutcome::Present,
            other => {
                tracing::warn!(
                    package_id = %id,
                    version = %version,
                    result = other.as_str(),
                    "Failed to index upstream package"
                );
                MirrorOutcome::Failed
            }
        }
    }
}

/// Make `url.join` append to the path instead of replacing its last segment.
pub(crate) fn as_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Upstream entries that cannot be parsed are skipped with a warning.
pub(crate) fn parse_versions<'a>(
    id: &PackageId,
    raw: impl IntoIterator<Item = &'a str>,
) -> Vec<NuGetVersion> {
    let mut versions: Vec<NuGetVersion> = raw
        .into_iter()
        .filter_map(|v| match NuGetVersion::parse(v) {
            Ok(version) => Some(version),
            Err(e) => {
                tracing::warn!(
                    package_id = %id,
                    version = v,
                    error = %e,
                    "Skipping unparsable upstream version"
                );
                None
            }
        })
        .collect();
    versions.sort();
    versions.dedup();
    versions
}
