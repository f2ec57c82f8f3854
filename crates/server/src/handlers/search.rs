//! Search and autocomplete endpoints.

use super::common::base_url;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use keg_metadata::{SearchRequest, SearchResult, SearchService};
use serde::{Deserialize, Serialize};

/// Largest page a client may ask for.
const MAX_TAKE: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub skip: Option<usize>,
    #[serde(default)]
    pub take: Option<usize>,
    #[serde(default)]
    pub prerelease: Option<bool>,
    #[serde(default)]
    pub sem_ver_level: Option<String>,
    #[serde(default)]
    pub package_type: Option<String>,
}

impl SearchQuery {
    fn into_request(self) -> SearchRequest {
        let include_semver2 = self
            .sem_ver_level
            .as_deref()
            .and_then(|level| level.split('.').next())
            .and_then(|major| major.parse::<u32>().ok())
            .is_some_and(|major| major >= 2);

        SearchRequest {
            query: self.q.unwrap_or_default().trim().to_string(),
            skip: self.skip.unwrap_or(0),
            take: self.take.unwrap_or(20).min(MAX_TAKE),
            include_prerelease: self.prerelease.unwrap_or(false),
            include_semver2,
            package_type: self.package_type.filter(|t| !t.trim().is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponseBody {
    pub total_hits: usize,
    pub data: Vec<SearchResultBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultBody {
    #[serde(rename = "@id")]
    pub url: String,
    #[serde(rename = "@type")]
    pub kind: &'static str,
    pub registration: String,
    pub id: String,
    pub version: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    pub tags: Vec<String>,
    pub authors: Vec<String>,
    pub total_downloads: i64,
    pub verified: bool,
    pub package_types: Vec<PackageTypeBody>,
    pub versions: Vec<SearchVersionBody>,
}

#[derive(Debug, Serialize)]
pub struct PackageTypeBody {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct SearchVersionBody {
    #[serde(rename = "@id")]
    pub url: String,
    pub version: String,
    pub downloads: i64,
}

fn result_body(base: &str, result: SearchResult) -> SearchResultBody {
    let id = result.id.lower();
    let registration = format!("{base}/v3/registration/{id}/index.json");
    let latest = result.latest;

    SearchResultBody {
        url: registration.clone(),
        kind: "Package",
        registration,
        id: result.id.to_string(),
        version: latest.version.full(),
        description: latest.description,
        summary: latest.summary,
        title: latest.title,
        icon_url: latest.icon_url,
        license_url: latest.license_url,
        project_url: latest.project_url,
        tags: latest.tags,
        authors: latest.authors,
        total_downloads: result.total_downloads,
        verified: false,
        package_types: latest
            .package_types
            .into_iter()
            .map(|t| PackageTypeBody { name: t.name })
            .collect(),
        versions: result
            .versions
            .into_iter()
            .map(|v| SearchVersionBody {
                url: format!("{base}/v3/registration/{id}/{}.json", v.version.lower()),
                version: v.version.full(),
                downloads: v.downloads,
            })
            .collect(),
    }
}

/// GET /v3/search
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<SearchResponseBody>> {
    let request = query.into_request();
    let response = state.metadata.search(&request).await?;
    let base = base_url(&headers);

    Ok(Json(SearchResponseBody {
        total_hits: response.total_hits,
        data: response
            .data
            .into_iter()
            .map(|r| result_body(&base, r))
            .collect(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteResponse {
    pub total_hits: usize,
    pub data: Vec<String>,
}

/// GET /v3/autocomplete
pub async fn autocomplete(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<AutocompleteResponse>> {
    let request = query.into_request();
    let data = state
        .metadata
        .autocomplete(&request.query, request.skip, request.take)
        .await?;
    Ok(Json(AutocompleteResponse {
        total_hits: data.len(),
        data,
    }))
}
