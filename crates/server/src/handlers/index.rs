//! Service index and health endpoints.

use super::common::base_url;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ServiceIndex {
    pub version: &'static str,
    pub resources: Vec<ServiceResource>,
}

#[derive(Debug, Serialize)]
pub struct ServiceResource {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub kind: &'static str,
    pub comment: &'static str,
}

/// GET /v3/index.json
pub async fn service_index(headers: HeaderMap) -> Json<ServiceIndex> {
    let base = base_url(&headers);
    let resource = |path: &str, kind: &'static str, comment: &'static str| ServiceResource {
        id: format!("{base}{path}"),
        kind,
        comment,
    };

    Json(ServiceIndex {
        version: "3.0.0",
        resources: vec![
            resource("/api/v2/package", "PackagePublish/2.0.0", "Push and delete packages"),
            resource("/v3/package/", "PackageBaseAddress/3.0.0", "Package content"),
            resource("/v3/registration/", "RegistrationsBaseUrl", "Package metadata"),
            resource(
                "/v3/registration/",
                "RegistrationsBaseUrl/3.6.0",
                "Package metadata, SemVer 2.0.0 aware",
            ),
            resource("/v3/search", "SearchQueryService", "Search packages"),
            resource("/v3/search", "SearchQueryService/3.5.0", "Search packages"),
            resource("/v3/autocomplete", "SearchAutocompleteService", "Package id completion"),
            resource(
                "/v3/package/{lower_id}/{lower_version}/readme",
                "ReadmeUriTemplate/6.13.0",
                "Package readme",
            ),
        ],
    })
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub storage: &'static str,
    pub mirror_enabled: bool,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state
        .store
        .health_check()
        .await
        .map_err(|e| ApiError::Unavailable(format!("storage: {e}")))?;
    state
        .metadata
        .health_check()
        .await
        .map_err(|e| ApiError::Unavailable(format!("metadata: {e}")))?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        storage: state.store.backend_name(),
        mirror_enabled: state.mirror.is_enabled(),
    }))
}
