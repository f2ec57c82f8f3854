//! Database rows and their conversion to domain types.

use crate::error::MetadataResult;
use keg_core::{
    Dependency, NuGetVersion, Package, PackageHash, PackageId, PackageType, SemVerLevel,
};
use sqlx::FromRow;
use time::OffsetDateTime;

/// A row of the `packages` table.
#[derive(Debug, Clone, FromRow)]
pub struct PackageRow {
    pub package_key: i64,
    pub id: String,
    pub normalized_version: String,
    pub full_version: String,
    pub authors: String,
    pub description: String,
    pub summary: Option<String>,
    pub title: Option<String>,
    pub tags: String,
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
    pub is_prerelease: bool,
    pub listed: bool,
    pub downloads: i64,
    pub published: OffsetDateTime,
    pub semver_level: i64,
    pub package_hash: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DependencyRow {
    pub package_key: i64,
    pub dependency_id: Option<String>,
    pub version_range: Option<String>,
    pub target_framework: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PackageTypeRow {
    pub package_key: i64,
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TargetFrameworkRow {
    pub package_key: i64,
    pub moniker: String,
}

/// Child rows belonging to one package.
#[derive(Debug, Clone, Default)]
pub struct PackageChildren {
    pub dependencies: Vec<DependencyRow>,
    pub package_types: Vec<PackageTypeRow>,
    pub target_frameworks: Vec<TargetFrameworkRow>,
}

impl PackageRow {
    /// Rebuild the domain package from a row and its children.
    pub fn into_package(self, children: PackageChildren) -> MetadataResult<Package> {
        let package_hash = self
            .package_hash
            .as_deref()
            .map(PackageHash::from_base64)
            .transpose()?;

        Ok(Package {
            id: PackageId::new(self.id)?,
            version: NuGetVersion::parse(&self.full_version)?,
            authors: serde_json::from_str(&self.authors)?,
            description: self.description,
            summary: self.summary,
            title: self.title,
            tags: serde_json::from_str(&self.tags)?,
            icon_url: self.icon_url,
            license_url: self.license_url,
            project_url: self.project_url,
            repository_url: self.repository_url,
            repository_type: self.repository_type,
            language: self.language,
            release_notes: self.release_notes,
            copyright: self.copyright,
            min_client_version: self.min_client_version,
            require_license_acceptance: self.require_license_acceptance,
            has_readme: self.has_readme,
            has_embedded_icon: self.has_embedded_icon,
            listed: self.listed,
            downloads: self.downloads,
            published: self.published,
            semver_level: SemVerLevel::from_i64(self.semver_level),
            package_hash,
            dependencies: children
                .dependencies
                .into_iter()
                .map(|d| Dependency {
                    id: d.dependency_id,
                    version_range: d.version_range,
                    target_framework: d.target_framework,
                })
                .collect(),
            package_types: children
                .package_types
                .into_iter()
                .map(|t| PackageType {
                    name: t.name,
                    version: t.version,
                })
                .collect(),
            target_frameworks: children
                .target_frameworks
                .into_iter()
                .map(|f| f.moniker)
                .collect(),
        })
    }
}

/// Lowercased text the search projection matches queries against.
pub fn search_text(package: &Package) -> String {
    let mut parts: Vec<&str> = vec![package.id.as_str(), package.description.as_str()];
    parts.extend(package.title.as_deref());
    parts.extend(package.summary.as_deref());
    parts.extend(package.tags.iter().map(String::as_str));
    parts.extend(package.authors.iter().map(String::as_str));
    parts.join(" ").to_lowercase()
}

/// Space-delimited lowercase package type names, padded so `% name %` matches whole words.
pub fn package_type_text(package: &Package) -> String {
    let names: Vec<String> = if package.package_types.is_empty() {
        vec!["dependency".to_string()]
    } else {
        package
            .package_types
            .iter()
            .map(|t| t.name.to_lowercase())
            .collect()
    };
    format!(" {} ", names.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package() -> Package {
        let mut package = Package::new(
            PackageId::new("Foo.Bar").unwrap(),
            NuGetVersion::parse("1.0.0").unwrap(),
            "Does Things",
        );
        package.tags = vec!["json".to_string(), "Parser".to_string()];
        package.authors = vec!["Alice".to_string()];
        package
    }

    #[test]
    fn test_search_text_is_lowercase() {
        let text = search_text(&package());
        assert_eq!(text, "foo.bar does things json parser alice");
    }

    #[test]
    fn test_package_type_text_defaults_to_dependency() {
        let mut package = package();
        assert_eq!(package_type_text(&package), " dependency ");

        package.package_types = vec![PackageType {
            name: "DotnetTool".to_string(),
            version: None,
        }];
        assert_eq!(package_type_text(&package), " dotnettool ");
    }
}
