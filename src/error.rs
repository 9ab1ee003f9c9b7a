// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    /// Invariant violation inside the engine (e.g. an ACTIVE session whose
    /// embedded paper is missing or corrupt). Logged loudly, surfaced as an
    /// opaque 500: this is a bug, not a user error.
    Integrity(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden (role mismatch)
    Forbidden(String),

    /// Eligibility gate failure. Expected and recoverable-by-waiting;
    /// always surfaced verbatim. `next_allowed_at` is set for cooldowns.
    Eligibility {
        reason: String,
        next_allowed_at: Option<DateTime<Utc>>,
    },

    // 404 Not Found (incl. exam not configured for a target)
    NotFound(String),

    // 409 Conflict (session not in the required state, duplicate submit)
    Conflict(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "Internal Server Error"}),
                )
            }
            AppError::Integrity(msg) => {
                tracing::error!("Integrity violation: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "Internal Server Error"}),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({"error": msg})),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, json!({"error": msg})),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({"error": msg})),
            AppError::Eligibility {
                reason,
                next_allowed_at,
            } => (
                StatusCode::FORBIDDEN,
                json!({"error": reason, "nextAllowedAt": next_allowed_at}),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({"error": msg})),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({"error": msg})),
        };

        (status, Json(body)).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
