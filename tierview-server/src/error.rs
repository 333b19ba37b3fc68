//! Error types for tierview-server
//!
//! [`EditError`] is the edit engine's taxonomy; every variant carries a short
//! mnemonic-plus-numeric code so the HTTP layer can pick a status without the
//! engine knowing about HTTP. [`ApiError`] adds the request-level failures
//! (session, ownership, body parsing) and renders `{code, message}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Edit engine error
#[derive(Debug, Error)]
pub enum EditError {
    /// Malformed or out-of-range input, caught before any side effect
    #[error("{message}")]
    Validation { code: String, message: String },

    /// An unchanged image paragraph names a file never stored for this entity
    #[error("Image reference is not stored for this entity: {0}")]
    DanglingReference(String),

    /// Payload is not base64 or not a decodable image
    #[error("Image could not be decoded: {0}")]
    Decode(String),

    /// Image shape is outside the profile's aspect band
    #[error("Image aspect ratio {ratio:.3} is outside the allowed band around {expected:.3}")]
    Aspect { ratio: f32, expected: f32 },

    /// Every candidate file name was already taken
    #[error("No unused file name after {attempts} attempts")]
    RetryExhausted { attempts: usize },

    /// Writing an image file failed
    #[error("Image storage error: {0}")]
    Storage(#[source] std::io::Error),

    /// The edit transaction failed and was rolled back
    #[error("Transaction failed: {0}")]
    Transaction(#[source] tierview_common::Error),

    /// Reading the pre-edit state failed
    #[error("Database error: {0}")]
    Database(#[from] tierview_common::Error),

    /// The tier or review does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Background task failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EditError {
    pub fn validation(code: &str, message: impl Into<String>) -> Self {
        EditError::Validation {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Stable error code reported to clients
    pub fn code(&self) -> &str {
        match self {
            EditError::Validation { code, .. } => code,
            EditError::DanglingReference(_) => "rcon-001",
            EditError::Decode(_) => "timg-001",
            EditError::Aspect { .. } => "timg-002",
            EditError::RetryExhausted { .. } => "timg-003",
            EditError::Storage(_) => "timg-004",
            EditError::Transaction(_) => "etxn-001",
            EditError::Database(_) => "db00-001",
            EditError::NotFound(_) => "gen0-005",
            EditError::Internal(_) => "gen0-500",
        }
    }
}

/// HTTP-facing error
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, unknown or expired session (403)
    #[error("No valid session")]
    NoSession,

    /// Request body could not be parsed (400)
    #[error("Request body could not be read: {0}")]
    UnreadableBody(String),

    /// Caller does not own the target (403)
    #[error("Not allowed to edit this resource")]
    NotOwner,

    /// Session posted again before the minimum post span elapsed (400)
    #[error("Posts must be at least {0} seconds apart")]
    TooFrequent(i64),

    /// Invalid path or query parameter (400)
    #[error("{message}")]
    BadRequest { code: String, message: String },

    /// Resource not found (404)
    #[error("{message}")]
    NotFound { code: String, message: String },

    /// Edit engine failure
    #[error(transparent)]
    Edit(#[from] EditError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(code: &str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(code: &str, message: impl Into<String>) -> Self {
        ApiError::NotFound {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            ApiError::NoSession => "gen0-001",
            ApiError::UnreadableBody(_) => "gen0-002",
            ApiError::NotOwner => "gen0-003",
            ApiError::TooFrequent(_) => "gen0-004",
            ApiError::BadRequest { code, .. } | ApiError::NotFound { code, .. } => code,
            ApiError::Edit(e) => e.code(),
            ApiError::Internal(_) => "gen0-500",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoSession | ApiError::NotOwner => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } | ApiError::Edit(EditError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Internal(_) | ApiError::Edit(EditError::Internal(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<tierview_common::Error> for ApiError {
    fn from(e: tierview_common::Error) -> Self {
        ApiError::Edit(EditError::Database(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "Request rejected");
        }

        let body = Json(json!({
            "code": self.code(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
