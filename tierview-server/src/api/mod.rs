//! HTTP handlers
//!
//! Handlers stay thin: parse, check ownership, hand off to the
//! [`EditCoordinator`](crate::services::EditCoordinator).

pub mod auth;
pub mod files;
pub mod health;
pub mod reviews;
pub mod tiers;
pub mod users;

pub use auth::{require_session, SessionUser};
pub use health::health_routes;

use crate::error::{ApiError, ApiResult};
use axum::extract::rejection::JsonRejection;
use axum::Json;

/// Unwrap a JSON body, mapping parse failures to `gen0-002`
pub(crate) fn read_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::UnreadableBody(e.body_text()))
}

/// Require that the looked-up owner exists and is the session user
pub(crate) fn ensure_owner(
    owner: Option<String>,
    user: &SessionUser,
    not_found_code: &str,
    what: &str,
) -> ApiResult<()> {
    match owner {
        None => Err(ApiError::not_found(not_found_code, format!("{} not found", what))),
        Some(owner) if owner != user.user_id => Err(ApiError::NotOwner),
        Some(_) => Ok(()),
    }
}
