//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use axum::body::Body;
use axum::http::HeaderMap;
use axum::http::header::HOST;
use futures::StreamExt;
use keg_core::{NuGetVersion, PackageId};
use keg_storage::ByteStream;

/// Parse a package identity from path segments.
///
/// Read endpoints answer 404 for identities that cannot exist.
pub fn read_identity(id: &str, version: &str) -> ApiResult<(PackageId, NuGetVersion)> {
    let not_found = || ApiError::NotFound(format!("package {id} {version} not found"));
    let id = PackageId::new(id).map_err(|_| not_found())?;
    let version = NuGetVersion::parse(version).map_err(|_| not_found())?;
    Ok((id, version))
}

pub fn read_id(id: &str) -> ApiResult<PackageId> {
    PackageId::new(id).map_err(|_| ApiError::NotFound(format!("package {id} not found")))
}

/// Parse a package identity for a write endpoint. Invalid input is a 400.
pub fn write_identity(id: &str, version: &str) -> ApiResult<(PackageId, NuGetVersion)> {
    Ok((PackageId::new(id)?, NuGetVersion::parse(version)?))
}

/// External base URL of this feed, without a trailing slash.
///
/// Honours `X-Forwarded-Proto` and `X-Forwarded-Host` from a reverse proxy.
pub fn base_url(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let scheme = header("x-forwarded-proto").unwrap_or("http");
    let host = header("x-forwarded-host")
        .or_else(|| header(HOST.as_str()))
        .unwrap_or("localhost");
    format!("{scheme}://{host}")
}

/// Response body streamed from storage.
pub fn stream_body(stream: ByteStream) -> Body {
    Body::from_stream(stream.map(|result| result.map_err(|e| std::io::Error::other(e.to_string()))))
}
