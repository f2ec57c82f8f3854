//! Package deletion policies.
//!
//! A delete request either unlists the package or removes it entirely,
//! depending on `deletion.behavior`. With `hard_delete`, an optional allow
//! pattern narrows which identities may be removed; everything else is
//! unlisted instead.

use crate::error::ServiceError;
use crate::metrics::PACKAGE_DELETIONS;
use keg_core::config::{DeletionBehavior, DeletionConfig};
use keg_core::{NuGetVersion, PackageId};
use keg_metadata::PackageDatabase;
use keg_storage::PackageStorage;
use regex::Regex;
use std::sync::Arc;
use tracing::instrument;

/// Remove a package's metadata, then its content.
///
/// Storage is cleaned even when no metadata row was found. Returns whether
/// the metadata row existed.
#[instrument(skip_all, fields(package_id = %id, version = %version))]
pub async fn hard_delete_package(
    database: &dyn PackageDatabase,
    storage: &PackageStorage,
    id: &PackageId,
    version: &NuGetVersion,
) -> Result<bool, ServiceError> {
    let found = database.hard_delete(id, version).await?;
    storage.delete(id, version).await?;
    tracing::info!(found, "Package hard deleted");
    Ok(found)
}

/// Applies the configured deletion policy.
pub struct DeletionService {
    database: Arc<dyn PackageDatabase>,
    storage: PackageStorage,
    behavior: DeletionBehavior,
    allow_pattern: Option<Regex>,
}

impl DeletionService {
    /// Build the service. Fails if the allow pattern is not a valid regex.
    pub fn new(
        config: &DeletionConfig,
        database: Arc<dyn PackageDatabase>,
        storage: PackageStorage,
    ) -> Result<Self, regex::Error> {
        let allow_pattern = config
            .hard_delete_allow_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()?;
        Ok(Self {
            database,
            storage,
            behavior: config.behavior,
            allow_pattern,
        })
    }

    /// The policy that a delete of this identity will apply.
    pub fn policy_for(&self, id: &PackageId, version: &NuGetVersion) -> DeletionBehavior {
        match (self.behavior, &self.allow_pattern) {
            (DeletionBehavior::HardDelete, Some(pattern))
                if !pattern.is_match(&format!("{id} {}", version.normalized())) =>
            {
                DeletionBehavior::Unlist
            }
            (behavior, _) => behavior,
        }
    }

    /// Delete a package under the configured policy.
    ///
    /// Returns false when the package does not exist.
    #[instrument(skip_all, fields(package_id = %id, version = %version))]
    pub async fn try_delete(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
    ) -> Result<bool, ServiceError> {
        let found = match self.policy_for(id, version) {
            DeletionBehavior::Unlist => {
                let found = self.database.update_listed(id, version, false).await?;
                PACKAGE_DELETIONS.with_label_values(&["unlist"]).inc();
                found
            }
            DeletionBehavior::HardDelete => {
                let found =
                    hard_delete_package(self.database.as_ref(), &self.storage, id, version)
                        .await?;
                PACKAGE_DELETIONS.with_label_values(&["hard_delete"]).inc();
                found
            }
        };
        if !found {
            tracing::debug!("Delete requested for missing package");
        }
        Ok(found)
    }

    /// Make an unlisted package visible again. Returns false when it does not exist.
    #[instrument(skip_all, fields(package_id = %id, version = %version))]
    pub async fn relist(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
    ) -> Result<bool, ServiceError> {
        Ok(self.database.update_listed(id, version, true).await?)
    }
}
