/**
 * Operator Authentication
 * Bearer JWT verification for mutating page-content routes
 */
use axum::http::{HeaderMap, StatusCode};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::routes::{failure, ApiFailure};

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

lazy_static::lazy_static! {
    /// JWT secret key from environment
    pub static ref JWT_SECRET: String = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string());
}

/// Default lifetime of an operator token in hours
pub const DEFAULT_TOKEN_EXPIRY_HOURS: i64 = 12;

// ============================================================================
// Types
// ============================================================================

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,   // Operator ID
    pub email: String, // Operator email
    pub role: String,  // Operator role
    pub exp: i64,      // Expiry timestamp
    pub iat: i64,      // Issued at timestamp
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Create access token
pub fn create_access_token(
    user_id: &str,
    email: &str,
    role: &str,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + ttl;

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        role: role.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
}

/// Verify and decode access token
pub fn verify_access_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Gate for mutating handlers.
pub fn verify_auth(headers: &HeaderMap) -> Result<Claims, ApiFailure> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "Authorization required"))?;

    verify_access_token(token).map_err(|e| {
        tracing::debug!("Token verification failed: {}", e);
        failure(StatusCode::UNAUTHORIZED, "Invalid or expired token")
    })
}
