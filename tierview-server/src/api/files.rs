//! Stored image download

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::StatusCode,
    response::Response,
};
use tierview_common::codes::is_code;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::{ApiError, ApiResult};
use crate::services::{AssetCategory, AssetTarget};
use crate::AppState;

fn is_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_')
}

/// GET /userfile/:uid/:category/:id/:fname
pub async fn get_user_file(
    State(state): State<AppState>,
    Path((user_id, category, entity_id, file_name)): Path<(String, String, String, String)>,
    request: Request,
) -> ApiResult<Response> {
    if !is_code(&user_id) || !is_code(&entity_id) {
        return Err(ApiError::bad_request("file-001", "invalid owner or entity id"));
    }
    let category: AssetCategory = category
        .parse()
        .map_err(|e: String| ApiError::bad_request("file-002", e))?;
    if !is_file_name(&file_name) {
        return Err(ApiError::bad_request("file-003", "invalid file name"));
    }

    let reference = AssetTarget::new(&user_id, category, &entity_id).file_reference(&file_name);
    let path = state
        .coordinator
        .store()
        .resolve(&reference)
        .map_err(|e| ApiError::bad_request("file-003", e.to_string()))?;

    let response = ServeFile::new(path)
        .oneshot(request)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if response.status() == StatusCode::NOT_FOUND {
        return Err(ApiError::not_found("file-004", "file not found"));
    }

    Ok(response.map(Body::new))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_rules() {
        assert!(is_file_name("icon_Ab12.jpg"));
        assert!(!is_file_name(".hidden"));
        assert!(!is_file_name("a/b.jpg"));
        assert!(!is_file_name("a-b.jpg"));
        assert!(!is_file_name(""));
    }
}
