/**
 * Routes Module
 * API route handlers
 */
use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

use crate::db;

pub mod auth;
pub mod components;
pub mod health;
pub mod pages;
pub mod settings;

/// Error body shared by every route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Success response (for delete)
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

pub type ApiFailure = (StatusCode, Json<ErrorResponse>);

pub fn failure(status: StatusCode, error: &str) -> ApiFailure {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: None,
            message: None,
        }),
    )
}

pub fn bad_request(error: &str, message: Option<String>) -> ApiFailure {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.to_string(),
            code: None,
            message,
        }),
    )
}

pub fn not_found() -> ApiFailure {
    failure(StatusCode::NOT_FOUND, "Not found")
}

/// Pool handle or the 503 every data route answers without a database.
pub fn require_pool() -> Result<Arc<PgPool>, ApiFailure> {
    db::get_pool().ok_or_else(|| failure(StatusCode::SERVICE_UNAVAILABLE, "Database not available"))
}

/// Logs the database error and answers 500 with `error`.
pub fn database_failure(context: &str, err: &sqlx::Error, error: &str) -> ApiFailure {
    tracing::error!("Database error {}: {}", context, err);
    failure(StatusCode::INTERNAL_SERVER_ERROR, error)
}
