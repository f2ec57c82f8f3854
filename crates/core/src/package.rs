//! Package metadata model.

use crate::hash::PackageHash;
use crate::id::PackageId;
use crate::version::NuGetVersion;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// SemVer level a package requires of its clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemVerLevel {
    /// SemVer 1.0 compatible, understood by every client.
    #[default]
    Unknown,
    /// Needs a SemVer 2.0 aware client.
    SemVer2,
}

impl SemVerLevel {
    /// Integer form stored in the database.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Unknown => 0,
            Self::SemVer2 => 2,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        if value >= 2 { Self::SemVer2 } else { Self::Unknown }
    }
}

/// A dependency entry.
///
/// A dependency group with no dependencies is stored as a single entry with
/// `id` and `version_range` both unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: Option<String>,
    pub version_range: Option<String>,
    pub target_framework: Option<String>,
}

impl Dependency {
    /// Placeholder entry for an empty dependency group.
    pub fn empty_group(target_framework: Option<String>) -> Self {
        Self {
            id: None,
            version_range: None,
            target_framework,
        }
    }
}

/// A declared package type such as `Dependency` or `DotnetTool`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageType {
    pub name: String,
    pub version: Option<String>,
}

/// A package version and everything known about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub version: NuGetVersion,
    pub authors: Vec<String>,
    pub description: String,
    pub summary: Option<String>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub icon_url: Option<String>,
    pub license_url: Option<String>,
    pub project_url: Option<String>,
    pub repository_url: Option<String>,
    pub repository_type: Option<String>,
    pub language: Option<String>,
    pub release_notes: Option<String>,
    pub copyright: Option<String>,
    pub min_client_version: Option<String>,
    pub require_license_acceptance: bool,
    pub has_readme: bool,
    pub has_embedded_icon: bool,
    pub listed: bool,
    pub downloads: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub published: OffsetDateTime,
    pub semver_level: SemVerLevel,
    pub package_hash: Option<PackageHash>,
    pub dependencies: Vec<Dependency>,
    pub package_types: Vec<PackageType>,
    pub target_frameworks: Vec<String>,
}

impl Package {
    /// Minimal listed package, used by mirrors and tests.
    pub fn new(id: PackageId, version: NuGetVersion, description: impl Into<String>) -> Self {
        let semver_level = if version.is_semver2() {
            SemVerLevel::SemVer2
        } else {
            SemVerLevel::Unknown
        };
        Self {
            id,
            version,
            authors: Vec::new(),
            description: description.into(),
            summary: None,
            title: None,
            tags: Vec::new(),
            icon_url: None,
            license_url: None,
            project_url: None,
            repository_url: None,
            repository_type: None,
            language: None,
            release_notes: None,
            copyright: None,
            min_client_version: None,
            require_license_acceptance: false,
            has_readme: false,
            has_embedded_icon: false,
            listed: true,
            downloads: 0,
            published: OffsetDateTime::now_utc(),
            semver_level,
            package_hash: None,
            dependencies: Vec::new(),
            package_types: Vec::new(),
            target_frameworks: Vec::new(),
        }
    }

    pub fn is_prerelease(&self) -> bool {
        self.version.is_prerelease()
    }

    /// Identity string, `"{id} {normalized version}"`.
    pub fn identity(&self) -> String {
        format!("{} {}", self.id, self.version.normalized())
    }
}
