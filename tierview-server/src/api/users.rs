//! User profile endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};

use super::{read_body, SessionUser};
use crate::db::users;
use crate::error::{ApiError, ApiResult};
use crate::models::{UserEdit, UserView};
use crate::AppState;

/// POST /user
///
/// Creates the profile of the session's user.
pub async fn create_user(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    payload: Result<Json<UserEdit>, JsonRejection>,
) -> ApiResult<(StatusCode, String)> {
    let edit = read_body(payload)?;
    let user_id = state.coordinator.create_user(&user.user_id, edit).await?;
    Ok((StatusCode::CREATED, user_id))
}

/// GET /user/:uid
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserView>> {
    let user = users::get_user(&state.db, &user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("gusr-001", "user not found"))?;
    Ok(Json(user.into()))
}

/// PATCH /user/:uid
pub async fn edit_user(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(user_id): Path<String>,
    payload: Result<Json<UserEdit>, JsonRejection>,
) -> ApiResult<String> {
    let edit = read_body(payload)?;
    if user.user_id != user_id {
        return Err(ApiError::NotOwner);
    }

    Ok(state.coordinator.edit_user(&user_id, edit).await?)
}
