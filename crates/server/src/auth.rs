//! API key check for write endpoints.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use keg_core::api_key_hash;

/// Header NuGet clients send the API key in.
pub const API_KEY_HEADER: &str = "x-nuget-apikey";

/// Check the request's API key against `server.api_key_hash`.
///
/// Open when no hash is configured.
pub fn check_api_key(expected_hash: Option<&str>, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = expected_hash else {
        return Ok(());
    };

    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("missing API key".to_string()))?;

    if api_key_hash(provided).eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("invalid API key".to_string()))
    }
}

/// Middleware guarding push, delete and relist.
pub async fn api_key_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(e) = check_api_key(state.config.server.api_key_hash.as_deref(), req.headers()) {
        tracing::debug!(method = %req.method(), path = %req.uri().path(), "Rejected write request");
        return Err(e);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_open_without_configured_hash() {
        assert!(check_api_key(None, &HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_key_must_match_hash() {
        let hash = api_key_hash("secret");
        let mut headers = HeaderMap::new();

        assert!(matches!(
            check_api_key(Some(&hash), &headers),
            Err(ApiError::Unauthorized(_))
        ));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("wrong"));
        assert!(matches!(
            check_api_key(Some(&hash), &headers),
            Err(ApiError::Unauthorized(_))
        ));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("secret"));
        assert!(check_api_key(Some(&hash), &headers).is_ok());
        assert!(check_api_key(Some(&hash.to_uppercase()), &headers).is_ok());
    }
}
