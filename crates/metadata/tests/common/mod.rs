//! Metadata store test utilities.

use keg_core::{Dependency, NuGetVersion, Package, PackageId, PackageType};
use keg_metadata::{MetadataResult, MetadataStore, SqliteStore};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tempfile::TempDir;

/// A test metadata store backed by a file in a temp directory.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<SqliteStore>,
    _temp_dir: TempDir,
}

impl TestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStore::new(temp_dir.path().join("test.db")).await?;
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }

    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        self.store.pool()
    }
}

/// A listed package with one dependency group and a framework.
pub fn package(id: &str, version: &str) -> Package {
    let mut package = Package::new(
        PackageId::new(id).expect("valid id"),
        NuGetVersion::parse(version).expect("valid version"),
        format!("{id} description"),
    );
    package.authors = vec!["Test Author".to_string()];
    package.tags = vec!["test".to_string()];
    package.dependencies = vec![
        Dependency {
            id: Some("Dep.One".to_string()),
            version_range: Some("[1.0.0, )".to_string()),
            target_framework: Some("net8.0".to_string()),
        },
        Dependency::empty_group(Some("netstandard2.0".to_string())),
    ];
    package.package_types = vec![PackageType {
        name: "Dependency".to_string(),
        version: None,
    }];
    package.target_frameworks = vec!["net8.0".to_string(), "netstandard2.0".to_string()];
    package
}

#[allow(dead_code)]
pub fn id(s: &str) -> PackageId {
    PackageId::new(s).expect("valid id")
}

#[allow(dead_code)]
pub fn version(s: &str) -> NuGetVersion {
    NuGetVersion::parse(s).expect("valid version")
}
