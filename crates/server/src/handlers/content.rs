//! Package content endpoints (flat container).

use super::common::{read_id, read_identity, stream_body};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use keg_storage::ByteStream;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
pub struct VersionsResponse {
    pub versions: Vec<String>,
}

/// GET /v3/package/{id}/index.json
pub async fn get_package_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<VersionsResponse>> {
    let id = read_id(&id)?;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let versions = state.content.get_versions(&id, &cancel).await?;
    if versions.is_empty() {
        return Err(ApiError::NotFound(format!("package {id} not found")));
    }
    Ok(Json(VersionsResponse {
        versions: versions.iter().map(|v| v.lower()).collect(),
    }))
}

/// Which blob a content request names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentFile {
    Package,
    Nuspec,
    Readme,
    Icon,
}

impl ContentFile {
    fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "readme" => Some(Self::Readme),
            "icon" => Some(Self::Icon),
            _ if name.ends_with(".nupkg") => Some(Self::Package),
            _ if name.ends_with(".nuspec") => Some(Self::Nuspec),
            _ => None,
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            Self::Package => "application/octet-stream",
            Self::Nuspec => "text/xml",
            Self::Readme => "text/markdown",
            Self::Icon => "application/octet-stream",
        }
    }
}

/// GET /v3/package/{id}/{version}/{file}
///
/// `file` is `{id}.{version}.nupkg`, `{id}.nuspec`, `readme` or `icon`.
pub async fn get_package_file(
    State(state): State<AppState>,
    Path((id, version, file)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    let kind = ContentFile::from_name(&file)
        .ok_or_else(|| ApiError::NotFound(format!("unknown package file {file}")))?;
    let (id, version) = read_identity(&id, &version)?;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let content = &state.content;
    let stream: Option<ByteStream> = match kind {
        ContentFile::Package => content.get_package_content(&id, &version, &cancel).await?,
        ContentFile::Nuspec => content.get_nuspec(&id, &version, &cancel).await?,
        ContentFile::Readme => content.get_readme(&id, &version, &cancel).await?,
        ContentFile::Icon => content.get_icon(&id, &version, &cancel).await?,
    };
    let stream =
        stream.ok_or_else(|| ApiError::NotFound(format!("package {id} {version} not found")))?;

    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, kind.content_type())],
        stream_body(stream),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_file_from_name() {
        assert_eq!(ContentFile::from_name("foo.1.0.0.nupkg"), Some(ContentFile::Package));
        assert_eq!(ContentFile::from_name("Foo.NUSPEC"), Some(ContentFile::Nuspec));
        assert_eq!(ContentFile::from_name("readme"), Some(ContentFile::Readme));
        assert_eq!(ContentFile::from_name("icon"), Some(ContentFile::Icon));
        assert_eq!(ContentFile::from_name("foo.zip"), None);
    }
}
