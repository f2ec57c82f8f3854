//! Registration (package metadata) endpoint.

use super::common::{base_url, read_id};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use keg_core::{Dependency, Package};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
pub struct RegistrationIndex {
    #[serde(rename = "@id")]
    pub id: String,
    pub count: usize,
    pub items: Vec<RegistrationPage>,
}

#[derive(Debug, Serialize)]
pub struct RegistrationPage {
    #[serde(rename = "@id")]
    pub id: String,
    pub count: usize,
    pub lower: String,
    pub upper: String,
    pub items: Vec<RegistrationLeaf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationLeaf {
    #[serde(rename = "@id")]
    pub id: String,
    pub package_content: String,
    pub catalog_entry: CatalogEntry,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(rename = "@id")]
    pub url: String,
    pub id: String,
    pub version: String,
    pub authors: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_client_version: Option<String>,
    pub listed: bool,
    pub package_content: String,
    pub published: String,
    pub require_license_acceptance: bool,
    pub dependency_groups: Vec<DependencyGroup>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_framework: Option<String>,
    pub dependencies: Vec<DependencyItem>,
}

#[derive(Debug, Serialize)]
pub struct DependencyItem {
    pub id: String,
    pub range: String,
}

/// Group dependency rows by target framework, keeping first-seen order.
fn dependency_groups(dependencies: &[Dependency]) -> Vec<DependencyGroup> {
    let mut groups: Vec<DependencyGroup> = Vec::new();
    for dep in dependencies {
        let index = match groups
            .iter()
            .position(|g| g.target_framework == dep.target_framework)
        {
            Some(i) => i,
            None => {
                groups.push(DependencyGroup {
                    target_framework: dep.target_framework.clone(),
                    dependencies: Vec::new(),
                });
                groups.len() - 1
            }
        };
        if let Some(id) = &dep.id {
            groups[index].dependencies.push(DependencyItem {
                id: id.clone(),
                range: dep.version_range.clone().unwrap_or_else(|| "(, )".to_string()),
            });
        }
    }
    groups
}

fn leaf(base: &str, package: &Package) -> RegistrationLeaf {
    let id = package.id.lower();
    let version = package.version.lower();
    let url = format!("{base}/v3/registration/{id}/{version}.json");
    let package_content = format!("{base}/v3/package/{id}/{version}/{id}.{version}.nupkg");

    RegistrationLeaf {
        id: url.clone(),
        package_content: package_content.clone(),
        catalog_entry: CatalogEntry {
            url,
            id: package.id.to_string(),
            version: package.version.full(),
            authors: package.authors.join(", "),
            description: package.description.clone(),
            summary: package.summary.clone(),
            title: package.title.clone(),
            tags: package.tags.clone(),
            icon_url: package.icon_url.clone(),
            license_url: package.license_url.clone(),
            project_url: package.project_url.clone(),
            language: package.language.clone(),
            min_client_version: package.min_client_version.clone(),
            listed: package.listed,
            package_content,
            published: package.published.format(&Rfc3339).unwrap_or_default(),
            require_license_acceptance: package.require_license_acceptance,
            dependency_groups: dependency_groups(&package.dependencies),
        },
    }
}

/// Build the registration index for `packages`, which must be non-empty and ascending.
fn registration_index(base: &str, packages: &[Package]) -> RegistrationIndex {
    let id = packages
        .first()
        .map(|p| p.id.lower())
        .unwrap_or_default();
    let lower = packages.first().map(|p| p.version.lower()).unwrap_or_default();
    let upper = packages.last().map(|p| p.version.lower()).unwrap_or_default();
    let index_url = format!("{base}/v3/registration/{id}/index.json");

    RegistrationIndex {
        id: index_url.clone(),
        count: 1,
        items: vec![RegistrationPage {
            id: format!("{index_url}#page/{lower}/{upper}"),
            count: packages.len(),
            lower,
            upper,
            items: packages.iter().map(|p| leaf(base, p)).collect(),
        }],
    }
}

/// GET /v3/registration/{id}/index.json
pub async fn get_registration_index(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<RegistrationIndex>> {
    let id = read_id(&id)?;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let packages = state
        .registrations
        .find_registration(&id, &cancel)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("package {id} not found")))?;

    Ok(Json(registration_index(&base_url(&headers), &packages)))
}
