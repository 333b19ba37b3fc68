//! tierview-server library
//!
//! HTTP service for user-owned tiers and their reviews: rich content with
//! embedded images, a per-tier scoring schema, and edits that keep stored
//! images and review scores consistent with every schema change.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tierview_common::codes::{CodeGenerator, HashedRandomCodes};
use tierview_common::config::AppConfig;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

use services::{AssetStore, EditCoordinator};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub coordinator: Arc<EditCoordinator>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: AppConfig) -> Self {
        Self::with_codes(db, config, Arc::new(HashedRandomCodes))
    }

    /// State with a specific id/file-name code source
    pub fn with_codes(db: SqlitePool, config: AppConfig, codes: Arc<dyn CodeGenerator>) -> Self {
        let coordinator = EditCoordinator::new(
            db.clone(),
            AssetStore::new(&config.storage_root),
            codes,
            config.limits.clone(),
        );
        Self {
            db,
            config: Arc::new(config),
            coordinator: Arc::new(coordinator),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// Reads and file downloads are public; every mutation goes through
/// [`api::require_session`]. Mutating routes accept bodies as large as their
/// configured image limits allow.
pub fn build_router(state: AppState) -> Router {
    let session = || middleware::from_fn_with_state(state.clone(), api::require_session);
    let limits = &state.config.limits;
    let tier_body = DefaultBodyLimit::max(limits.tier_body_max());
    let review_body = DefaultBodyLimit::max(limits.review_body_max());
    let user_body = DefaultBodyLimit::max(limits.user_body_max());

    Router::new()
        .route(
            "/tier",
            post(api::tiers::create_tier)
                .route_layer(session())
                .layer(tier_body),
        )
        .route(
            "/tier/:tid",
            get(api::tiers::get_tier).merge(
                patch(api::tiers::edit_tier)
                    .delete(api::tiers::delete_tier)
                    .route_layer(session())
                    .layer(tier_body),
            ),
        )
        .route(
            "/review",
            post(api::reviews::create_review)
                .route_layer(session())
                .layer(review_body),
        )
        .route(
            "/review/:rid",
            get(api::reviews::get_review).merge(
                patch(api::reviews::edit_review)
                    .delete(api::reviews::delete_review)
                    .route_layer(session())
                    .layer(review_body),
            ),
        )
        .route(
            "/user",
            post(api::users::create_user)
                .route_layer(session())
                .layer(user_body),
        )
        .route(
            "/user/:uid",
            get(api::users::get_user).merge(
                patch(api::users::edit_user)
                    .route_layer(session())
                    .layer(user_body),
            ),
        )
        .route(
            "/userfile/:uid/:category/:id/:fname",
            get(api::files::get_user_file),
        )
        .merge(api::health_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
