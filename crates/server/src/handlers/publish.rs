//! Push, delete and relist endpoints.

use super::common::write_identity;
use crate::error::{ApiError, ApiResult};
use crate::indexing::IndexingResult;
use crate::state::AppState;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

fn body_error(status: StatusCode, message: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(message)
    } else {
        ApiError::BadRequest(message)
    }
}

/// Read the package from a multipart form (first field) or a raw body.
async fn read_package(req: Request) -> ApiResult<Bytes> {
    let is_multipart = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if !is_multipart {
        return Bytes::from_request(req, &())
            .await
            .map_err(|e| body_error(e.status(), e.body_text()));
    }

    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(|e| body_error(e.status(), e.body_text()))?;
    let field = multipart
        .next_field()
        .await
        .map_err(|e| body_error(e.status(), e.body_text()))?
        .ok_or_else(|| ApiError::BadRequest("request has no package".to_string()))?;
    field
        .bytes()
        .await
        .map_err(|e| body_error(e.status(), e.body_text()))
}

/// PUT /api/v2/package
pub async fn push_package(State(state): State<AppState>, req: Request) -> ApiResult<StatusCode> {
    if state.config.server.read_only {
        return Err(ApiError::Forbidden("feed is read-only".to_string()));
    }

    let data = read_package(req).await?;
    if data.is_empty() {
        return Err(ApiError::BadRequest("package is empty".to_string()));
    }

    // Cancel the run if the client goes away.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match state.pipeline.index(data, &cancel).await {
        IndexingResult::Success => Ok(StatusCode::CREATED),
        IndexingResult::InvalidPackage => {
            Err(ApiError::BadRequest("package is invalid".to_string()))
        }
        IndexingResult::PackageAlreadyExists => {
            Err(ApiError::Conflict("package already exists".to_string()))
        }
        IndexingResult::UnexpectedError { message } => Err(ApiError::Internal(message)),
    }
}

/// DELETE /api/v2/package/{id}/{version}
pub async fn delete_package(
    State(state): State<AppState>,
    Path((id, version)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let (id, version) = write_identity(&id, &version)?;
    if state.deletion.try_delete(&id, &version).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("package {id} {version} not found")))
    }
}

/// POST /api/v2/package/{id}/{version}
pub async fn relist_package(
    State(state): State<AppState>,
    Path((id, version)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let (id, version) = write_identity(&id, &version)?;
    if state.deletion.relist(&id, &version).await? {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::NotFound(format!("package {id} {version} not found")))
    }
}
