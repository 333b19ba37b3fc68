//! Review endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};

use super::{ensure_owner, read_body, SessionUser};
use crate::db::{reviews, tiers};
use crate::error::{ApiError, ApiResult};
use crate::models::{ParameterView, ReviewDetailView, ReviewEdit, ReviewView};
use crate::AppState;

/// POST /review
///
/// Only the tier's owner may add reviews to it.
pub async fn create_review(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    payload: Result<Json<ReviewEdit>, JsonRejection>,
) -> ApiResult<(StatusCode, String)> {
    let edit = read_body(payload)?;
    let tier_id = edit
        .tier_id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("vrev-009", "tierId is required"))?;
    let owner = tiers::get_tier_owner(&state.db, &tier_id).await?;
    ensure_owner(owner, &user, "utir-001", "tier")?;

    let review_id = state.coordinator.create_review(&user.user_id, edit).await?;
    Ok((StatusCode::CREATED, review_id))
}

/// GET /review/:rid
pub async fn get_review(
    State(state): State<AppState>,
    Path(review_id): Path<String>,
) -> ApiResult<Json<ReviewDetailView>> {
    let review = reviews::get_review(&state.db, &review_id)
        .await?
        .ok_or_else(|| ApiError::not_found("urev-001", "review not found"))?;
    let tier = tiers::get_tier(&state.db, &review.tier_id)
        .await?
        .ok_or_else(|| ApiError::not_found("utir-001", "tier not found"))?;

    Ok(Json(ReviewDetailView {
        review: ReviewView::from(review),
        point_type: tier.point_type,
        evaluation_parameters: ParameterView::list(&tier.parameters),
    }))
}

/// PATCH /review/:rid
pub async fn edit_review(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(review_id): Path<String>,
    payload: Result<Json<ReviewEdit>, JsonRejection>,
) -> ApiResult<String> {
    let edit = read_body(payload)?;
    let owner = reviews::get_review(&state.db, &review_id)
        .await?
        .map(|review| review.user_id);
    ensure_owner(owner, &user, "urev-001", "review")?;

    Ok(state.coordinator.edit_review(&review_id, edit).await?)
}

/// DELETE /review/:rid
pub async fn delete_review(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(review_id): Path<String>,
) -> ApiResult<StatusCode> {
    let owner = reviews::get_review(&state.db, &review_id)
        .await?
        .map(|review| review.user_id);
    ensure_owner(owner, &user, "urev-001", "review")?;

    state.coordinator.delete_review(&review_id).await?;
    Ok(StatusCode::OK)
}
