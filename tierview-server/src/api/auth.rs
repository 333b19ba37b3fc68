//! Session middleware for mutating routes
//!
//! Resolves `Authorization: Bearer <sessionId>` against the sessions table,
//! enforces the minimum span between posts, and stamps `last_post_at` after a
//! successful mutation.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::db::sessions;
use crate::error::ApiError;
use crate::AppState;

/// Authenticated caller, available to handlers as a request extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub session_id: String,
    pub user_id: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers()).ok_or(ApiError::NoSession)?;
    let session = sessions::find_session(&state.db, &token)
        .await?
        .ok_or(ApiError::NoSession)?;

    let now = Utc::now();
    if session.is_expired(now) {
        debug!(user_id = %session.user_id, "Expired session");
        return Err(ApiError::NoSession);
    }

    let span = state.config.limits.post_span_secs;
    if let Some(last) = session.last_post_at {
        if now.signed_duration_since(last) < Duration::seconds(span) {
            return Err(ApiError::TooFrequent(span));
        }
    }

    request.extensions_mut().insert(SessionUser {
        session_id: session.session_id.clone(),
        user_id: session.user_id.clone(),
    });

    let response = next.run(request).await;

    if response.status().is_success() {
        if let Err(e) = sessions::touch_last_post(&state.db, &session.session_id, Utc::now()).await {
            warn!(user_id = %session.user_id, error = %e, "Failed to record post time");
        }
    }

    Ok(response)
}
