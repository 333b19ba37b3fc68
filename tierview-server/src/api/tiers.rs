//! Tier endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};

use super::{ensure_owner, read_body, SessionUser};
use crate::db::{reviews, tiers};
use crate::error::{ApiError, ApiResult};
use crate::models::{TierEdit, TierView};
use crate::AppState;

/// POST /tier
pub async fn create_tier(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    payload: Result<Json<TierEdit>, JsonRejection>,
) -> ApiResult<(StatusCode, String)> {
    let edit = read_body(payload)?;
    let tier_id = state.coordinator.create_tier(&user.user_id, edit).await?;
    Ok((StatusCode::CREATED, tier_id))
}

/// GET /tier/:tid
pub async fn get_tier(
    State(state): State<AppState>,
    Path(tier_id): Path<String>,
) -> ApiResult<Json<TierView>> {
    let tier = tiers::get_tier(&state.db, &tier_id)
        .await?
        .ok_or_else(|| ApiError::not_found("utir-001", "tier not found"))?;
    let reviews = reviews::list_reviews_in_tier(&state.db, &tier_id).await?;
    Ok(Json(TierView::new(tier, reviews)))
}

/// PATCH /tier/:tid
pub async fn edit_tier(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(tier_id): Path<String>,
    payload: Result<Json<TierEdit>, JsonRejection>,
) -> ApiResult<String> {
    let edit = read_body(payload)?;
    let owner = tiers::get_tier_owner(&state.db, &tier_id).await?;
    ensure_owner(owner, &user, "utir-001", "tier")?;

    Ok(state.coordinator.edit_tier(&tier_id, edit).await?)
}

/// DELETE /tier/:tid
pub async fn delete_tier(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(tier_id): Path<String>,
) -> ApiResult<StatusCode> {
    let owner = tiers::get_tier_owner(&state.db, &tier_id).await?;
    ensure_owner(owner, &user, "utir-001", "tier")?;

    state.coordinator.delete_tier(&tier_id).await?;
    Ok(StatusCode::OK)
}
