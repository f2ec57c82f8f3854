//! Upstream client for NuGet V3 feeds.

use super::{MirrorClient, MirrorError, Upstream, as_base, parse_versions};
use async_trait::async_trait;
use bytes::Bytes;
use keg_core::{Dependency, NuGetVersion, Package, PackageId, SemVerLevel, range_is_semver2};
use serde::Deserialize;
use std::collections::BTreeSet;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use url::Url;

const PACKAGE_BASE_ADDRESS: &str = "PackageBaseAddress/3.0.0";

/// Registration resources in order of preference.
const REGISTRATION_TYPES: &[&str] = &[
    "RegistrationsBaseUrl/3.6.0",
    "RegistrationsBaseUrl/3.4.0",
    "RegistrationsBaseUrl/Versioned",
    "RegistrationsBaseUrl/3.0.0-rc",
    "RegistrationsBaseUrl/3.0.0-beta",
    "RegistrationsBaseUrl",
];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn contains(&self, wanted: &str) -> bool {
        match self {
            Self::One(s) => s == wanted,
            Self::Many(v) => v.iter().any(|s| s == wanted),
        }
    }

    fn split(self, separators: &[char]) -> Vec<String> {
        let items = match self {
            Self::One(s) => s
                .split(|c| separators.contains(&c))
                .map(str::to_string)
                .collect(),
            Self::Many(v) => v,
        };
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ServiceIndex {
    #[serde(default)]
    resources: Vec<ServiceResource>,
}

#[derive(Debug, Deserialize)]
struct ServiceResource {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    kind: OneOrMany,
}

#[derive(Debug, Deserialize)]
struct FlatContainerVersions {
    #[serde(default)]
    versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RegistrationIndex {
    #[serde(default)]
    items: Vec<RegistrationPage>,
}

#[derive(Debug, Deserialize)]
struct RegistrationPage {
    #[serde(rename = "@id")]
    id: String,
    /// Absent when the page must be fetched separately.
    items: Option<Vec<RegistrationLeaf>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationLeaf {
    catalog_entry: CatalogEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    id: String,
    version: String,
    authors: Option<OneOrMany>,
    description: Option<String>,
    summary: Option<String>,
    title: Option<String>,
    tags: Option<OneOrMany>,
    icon_url: Option<String>,
    license_url: Option<String>,
    project_url: Option<String>,
    language: Option<String>,
    min_client_version: Option<String>,
    #[serde(default)]
    require_license_acceptance: bool,
    listed: Option<bool>,
    published: Option<String>,
    #[serde(default)]
    dependency_groups: Vec<DependencyGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DependencyGroup {
    target_framework: Option<String>,
    #[serde(default)]
    dependencies: Vec<DependencyEntry>,
}

#[derive(Debug, Deserialize)]
struct DependencyEntry {
    id: String,
    range: Option<String>,
}

/// Resource URLs read from the upstream service index.
#[derive(Debug, Clone)]
struct Endpoints {
    package_base: Url,
    registrations: Option<Url>,
}

impl Endpoints {
    fn from_index(index: ServiceIndex) -> Result<Self, MirrorError> {
        let find = |kind: &str| {
            index
                .resources
                .iter()
                .find(|r| r.kind.contains(kind))
                .map(|r| Url::parse(&r.id).map(as_base))
                .transpose()
        };

        let package_base = find(PACKAGE_BASE_ADDRESS)?.ok_or_else(|| {
            MirrorError::InvalidResponse(format!("service index has no {PACKAGE_BASE_ADDRESS}"))
        })?;

        let mut registrations = None;
        for kind in REGISTRATION_TYPES {
            if let Some(url) = find(kind)? {
                registrations = Some(url);
                break;
            }
        }

        Ok(Self {
            package_base,
            registrations,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_published(value: Option<&str>) -> OffsetDateTime {
    value
        .and_then(|v| OffsetDateTime::parse(v, &Rfc3339).ok())
        .unwrap_or_else(OffsetDateTime::now_utc)
}

impl CatalogEntry {
    fn into_package(self) -> keg_core::Result<Package> {
        let id = PackageId::new(self.id)?;
        let version = NuGetVersion::parse(&self.version)?;
        let published = parse_published(self.published.as_deref());

        let mut dependencies = Vec::new();
        let mut frameworks = BTreeSet::new();
        for group in self.dependency_groups {
            let framework = non_empty(group.target_framework);
            if let Some(tfm) = &framework {
                frameworks.insert(tfm.to_ascii_lowercase());
            }
            if group.dependencies.is_empty() {
                dependencies.push(Dependency::empty_group(framework));
                continue;
            }
            for dep in group.dependencies {
                dependencies.push(Dependency {
                    id: Some(dep.id),
                    version_range: non_empty(dep.range),
                    target_framework: framework.clone(),
                });
            }
        }

        let mut package = Package::new(id, version, self.description.unwrap_or_default());
        if dependencies
            .iter()
            .filter_map(|d| d.version_range.as_deref())
            .any(range_is_semver2)
        {
            package.semver_level = SemVerLevel::SemVer2;
        }
        package.authors = self.authors.map(|a| a.split(&[','])).unwrap_or_default();
        package.tags = self
            .tags
            .map(|t| t.split(&[' ', ',', ';']))
            .unwrap_or_default();
        package.summary = non_empty(self.summary);
        package.title = non_empty(self.title);
        package.icon_url = non_empty(self.icon_url);
        package.license_url = non_empty(self.license_url);
        package.project_url = non_empty(self.project_url);
        package.language = non_empty(self.language);
        package.min_client_version = non_empty(self.min_client_version);
        package.require_license_acceptance = self.require_license_acceptance;
        // nuget.org marks unlisted packages with a 1900 publish date.
        package.listed = self.listed.unwrap_or(published.year() > 1900);
        package.published = published;
        package.dependencies = dependencies;
        package.target_frameworks = frameworks.into_iter().collect();
        Ok(package)
    }
}

/// Mirrors a V3 feed through its flat container and registration resources.
pub struct V3MirrorClient {
    upstream: Upstream,
    service_index: Url,
    endpoints: OnceCell<Endpoints>,
}

impl V3MirrorClient {
    pub fn new(upstream: Upstream, service_index: Url) -> Self {
        Self {
            upstream,
            service_index,
            endpoints: OnceCell::new(),
        }
    }

    /// Resolve the service index once. Failures are retried on the next call.
    async fn endpoints(&self, cancel: &CancellationToken) -> Result<&Endpoints, MirrorError> {
        self.endpoints
            .get_or_try_init(|| async {
                let index: ServiceIndex = self
                    .upstream
                    .get_json(self.service_index.clone(), cancel)
                    .await?
                    .ok_or_else(|| MirrorError::Status {
                        url: self.service_index.to_string(),
                        status: 404,
                    })?;
                let endpoints = Endpoints::from_index(index)?;
                tracing::debug!(
                    package_base = %endpoints.package_base,
                    registrations = ?endpoints.registrations.as_ref().map(Url::as_str),
                    "Resolved upstream service index"
                );
                Ok::<_, MirrorError>(endpoints)
            })
            .await
    }

    async fn page_leaves(
        &self,
        page: RegistrationPage,
        cancel: &CancellationToken,
    ) -> Result<Vec<RegistrationLeaf>, MirrorError> {
        if let Some(items) = page.items {
            return Ok(items);
        }
        let url = Url::parse(&page.id)?;
        let page: Option<RegistrationPage> = self.upstream.get_json(url, cancel).await?;
        Ok(page.and_then(|p| p.items).unwrap_or_default())
    }
}

#[async_trait]
impl MirrorClient for V3MirrorClient {
    async fn list_versions(
        &self,
        id: &PackageId,
        cancel: &CancellationToken,
    ) -> Result<Vec<NuGetVersion>, MirrorError> {
        let endpoints = self.endpoints(cancel).await?;
        let url = endpoints
            .package_base
            .join(&format!("{}/index.json", id.lower()))?;

        let listing: Option<FlatContainerVersions> = self.upstream.get_json(url, cancel).await?;
        Ok(listing
            .map(|l| parse_versions(id, l.versions.iter().map(String::as_str)))
            .unwrap_or_default())
    }

    async fn list_metadata(
        &self,
        id: &PackageId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>, MirrorError> {
        let endpoints = self.endpoints(cancel).await?;
        let Some(registrations) = &endpoints.registrations else {
            return Ok(Vec::new());
        };
        let url = registrations.join(&format!("{}/index.json", id.lower()))?;

        let Some(index) = self
            .upstream
            .get_json::<RegistrationIndex>(url, cancel)
            .await?
        else {
            return Ok(Vec::new());
        };

        let mut packages = Vec::new();
        for page in index.items {
            for leaf in self.page_leaves(page, cancel).await? {
                let entry = leaf.catalog_entry;
                let label = format!("{} {}", entry.id, entry.version);
                match entry.into_package() {
                    Ok(package) => packages.push(package),
                    Err(e) => {
                        tracing::warn!(
                            entry = %label,
                            error = %e,
                            "Skipping unreadable registration entry"
                        );
                    }
                }
            }
        }
        packages.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(packages)
    }

    async fn download_package(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>, MirrorError> {
        let endpoints = self.endpoints(cancel).await?;
        let id = id.lower();
        let version = version.lower();
        let url = endpoints
            .package_base
            .join(&format!("{id}/{version}/{id}.{version}.nupkg"))?;
        self.upstream.get_bytes(url, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_prefer_semver2_registrations() {
        let index: ServiceIndex = serde_json::from_str(
            r#"{"version": "3.0.0", "resources": [
                {"@id": "https://example.com/flat", "@type": "PackageBaseAddress/3.0.0"},
                {"@id": "https://example.com/reg/", "@type": "RegistrationsBaseUrl"},
                {"@id": "https://example.com/reg-semver2/", "@type": ["RegistrationsBaseUrl/3.6.0", "RegistrationsBaseUrl/Versioned"]}
            ]}"#,
        )
        .unwrap();

        let endpoints = Endpoints::from_index(index).unwrap();
        assert_eq!(endpoints.package_base.as_str(), "https://example.com/flat/");
        assert_eq!(
            endpoints.registrations.unwrap().as_str(),
            "https://example.com/reg-semver2/"
        );
    }

    #[test]
    fn test_endpoints_require_package_base() {
        let index: ServiceIndex =
            serde_json::from_str(r#"{"resources": [{"@id": "https://example.com/reg/", "@type": "RegistrationsBaseUrl"}]}"#)
                .unwrap();
        assert!(matches!(
            Endpoints::from_index(index),
            Err(MirrorError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_catalog_entry_into_package() {
        let entry: CatalogEntry = serde_json::from_str(
            r#"{
                "id": "Newtonsoft.Json",
                "version": "13.0.1",
                "authors": "James Newton-King, Someone Else",
                "description": "Json.NET",
                "tags": ["json", "serializer"],
                "iconUrl": "",
                "projectUrl": "https://www.newtonsoft.com/json",
                "published": "2021-03-22T20:10:39.42+00:00",
                "requireLicenseAcceptance": false,
                "dependencyGroups": [
                    {"targetFramework": ".NETStandard2.0", "dependencies": [{"id": "System.Memory", "range": "[4.5.0, )"}]},
                    {"targetFramework": ".NETFramework4.5"}
                ]
            }"#,
        )
        .unwrap();

        let package = entry.into_package().unwrap();
        assert_eq!(package.id.as_str(), "Newtonsoft.Json");
        assert_eq!(package.authors, vec!["James Newton-King", "Someone Else"]);
        assert_eq!(package.tags, vec!["json", "serializer"]);
        assert!(package.icon_url.is_none());
        assert!(package.listed);
        assert_eq!(package.published.year(), 2021);
        assert_eq!(package.dependencies.len(), 2);
        assert_eq!(
            package.dependencies[1],
            Dependency::empty_group(Some(".NETFramework4.5".to_string()))
        );
        assert_eq!(
            package.target_frameworks,
            vec![".netframework4.5", ".netstandard2.0"]
        );
        assert_eq!(package.semver_level, SemVerLevel::Unknown);
    }

    #[test]
    fn test_catalog_entry_unlisted_by_publish_date() {
        let entry: CatalogEntry = serde_json::from_str(
            r#"{"id": "Foo", "version": "1.0.0", "published": "1900-01-01T00:00:00+00:00"}"#,
        )
        .unwrap();
        let package = entry.into_package().unwrap();
        assert!(!package.listed);
    }
}
