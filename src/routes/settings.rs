/**
 * Site Settings Routes
 * Footer key/value settings shared by every page
 */
use axum::{
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::models::SiteSetting;
use crate::routes::auth::verify_auth;
use crate::routes::{bad_request, database_failure, require_pool, ApiFailure};

/// Settings section served by these routes
const FOOTER_SECTION: &str = "footer";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response for GET /api/Settings/footer
#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub data: BTreeMap<String, String>,
}

/// Request body for PUT /api/Settings/footer
#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub settings: BTreeMap<String, String>,
}

/// Response for PUT /api/Settings/footer
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateSettingsResponse {
    pub success: bool,
    pub updated: usize,
}

fn validate_keys(settings: &BTreeMap<String, String>) -> Result<(), ApiFailure> {
    if settings.is_empty() {
        return Err(bad_request("No settings provided", None));
    }
    if let Some(key) = settings.keys().find(|k| k.trim().is_empty()) {
        return Err(bad_request(
            "Invalid setting key",
            Some(format!("Key {:?} must not be blank", key)),
        ));
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/Settings/footer
pub async fn get_footer_settings() -> Result<impl IntoResponse, ApiFailure> {
    let pool = require_pool()?;

    let rows = sqlx::query_as::<_, SiteSetting>(
        "SELECT section, key, value, updated_at FROM site_settings WHERE section = $1 ORDER BY key",
    )
    .bind(FOOTER_SECTION)
    .fetch_all(pool.as_ref())
    .await
    .map_err(|e| database_failure("loading footer settings", &e, "Failed to load settings"))?;

    let data = rows.into_iter().map(|row| (row.key, row.value)).collect();
    Ok((StatusCode::OK, Json(SettingsResponse { data })))
}

/// PUT /api/Settings/footer - Upsert footer settings (auth required)
pub async fn update_footer_settings(
    headers: HeaderMap,
    Json(payload): Json<UpdateSettingsRequest>,
) -> Result<impl IntoResponse, ApiFailure> {
    verify_auth(&headers)?;
    validate_keys(&payload.settings)?;

    let pool = require_pool()?;
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| database_failure("starting transaction", &e, "Failed to update settings"))?;

    for (key, value) in &payload.settings {
        sqlx::query(
            r#"
            INSERT INTO site_settings (section, key, value, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (section, key) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = now()
            "#,
        )
        .bind(FOOTER_SECTION)
        .bind(key.trim())
        .bind(value)
        .execute(&mut *tx)
        .await
        .map_err(|e| database_failure("upserting footer setting", &e, "Failed to update settings"))?;
    }

    tx.commit()
        .await
        .map_err(|e| database_failure("committing settings", &e, "Failed to update settings"))?;

    tracing::info!(count = payload.settings.len(), "footer settings updated");
    Ok((
        StatusCode::OK,
        Json(UpdateSettingsResponse {
            success: true,
            updated: payload.settings.len(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::auth::create_access_token;
    use crate::routes::ErrorResponse;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn settings_router() -> Router {
        Router::new().route(
            "/api/Settings/footer",
            get(get_footer_settings).put(update_footer_settings),
        )
    }

    async fn put_settings(auth: bool, body: serde_json::Value) -> (StatusCode, axum::body::Bytes) {
        let mut req = Request::builder()
            .method("PUT")
            .uri("/api/Settings/footer")
            .header("content-type", "application/json");
        if auth {
            let token = create_access_token(
                "op-1",
                "editor@example.com",
                "editor",
                chrono::Duration::hours(1),
            )
            .unwrap();
            req = req.header("authorization", format!("Bearer {}", token));
        }
        let res = settings_router()
            .oneshot(req.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    #[tokio::test]
    async fn test_get_without_database_returns_unavailable() {
        let req = Request::get("/api/Settings/footer")
            .body(Body::empty())
            .unwrap();
        let res = settings_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_put_requires_auth() {
        let (status, _) = put_settings(
            false,
            serde_json::json!({ "settings": { "copyright": "2026" } }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_put_rejects_blank_key() {
        let (status, bytes) =
            put_settings(true, serde_json::json!({ "settings": { " ": "x" } })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "Invalid setting key");
    }

    #[tokio::test]
    async fn test_put_rejects_empty_settings() {
        let (status, _) = put_settings(true, serde_json::json!({ "settings": {} })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
