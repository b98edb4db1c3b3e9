/**
 * Page Routes
 * CRUD API endpoints for pages
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::{
    self,
    models::{Page, PageComponentRow},
};
use crate::reconciler::model::ComponentRecord;
use crate::routes::auth::verify_auth;
use crate::routes::{
    bad_request, database_failure, failure, not_found, require_pool, ApiFailure, SuccessResponse,
};

/// Unique index on the page slug
const SLUG_CONSTRAINT: &str = "IX_Pages_Slug";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for GET /api/Pages (list)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageListQuery {
    pub category_id: Option<i64>,
    pub published: Option<bool>,
}

/// Full page response including its components in render order
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDetailResponse {
    #[serde(flatten)]
    pub page: Page,
    pub components: Vec<ComponentRecord>,
}

/// Request body for POST /api/Pages (create)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePageRequest {
    pub title: String,
    pub slug: String,
    pub category_id: Option<i64>,
    pub is_homepage: Option<bool>,
    pub is_published: Option<bool>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

/// Request body for PUT /api/Pages/{id} (update)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePageRequest {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub category_id: Option<i64>,
    pub is_homepage: Option<bool>,
    pub is_published: Option<bool>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

// ============================================================================
// Validation
// ============================================================================

lazy_static::lazy_static! {
    /// Valid slug pattern: lowercase letters, numbers, and hyphens
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}

fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

fn validate_slug(slug: &str) -> Result<(), ApiFailure> {
    if slug.trim().is_empty() {
        return Err(bad_request("Slug is required", None));
    }
    if !is_valid_slug(slug) {
        return Err(bad_request(
            "Invalid slug",
            Some("Slug must contain only lowercase letters, numbers, and hyphens".to_string()),
        ));
    }
    Ok(())
}

fn slug_conflict_or(err: sqlx::Error, context: &str, error: &str) -> ApiFailure {
    if db::is_unique_violation_on(&err, SLUG_CONSTRAINT) {
        return failure(StatusCode::CONFLICT, "Slug already exists");
    }
    database_failure(context, &err, error)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/Pages - List pages
pub async fn list_pages(
    Query(query): Query<PageListQuery>,
) -> Result<impl IntoResponse, ApiFailure> {
    let pool = require_pool()?;

    let pages = sqlx::query_as::<_, Page>(
        r#"
        SELECT id, title, slug, category_id, is_homepage, is_published, meta_title, meta_description, created_at, updated_at
        FROM pages
        WHERE ($1::BIGINT IS NULL OR category_id = $1)
          AND ($2::BOOLEAN IS NULL OR is_published = $2)
        ORDER BY is_homepage DESC, title
        "#,
    )
    .bind(query.category_id)
    .bind(query.published)
    .fetch_all(pool.as_ref())
    .await
    .map_err(|e| database_failure("listing pages", &e, "Failed to load pages"))?;

    Ok((StatusCode::OK, Json(pages)))
}

/// GET /api/Pages/{id} - Single page with its components
pub async fn get_page(Path(page_id): Path<i64>) -> Result<impl IntoResponse, ApiFailure> {
    let pool = require_pool()?;

    let page = sqlx::query_as::<_, Page>(
        r#"
        SELECT id, title, slug, category_id, is_homepage, is_published, meta_title, meta_description, created_at, updated_at
        FROM pages
        WHERE id = $1
        "#,
    )
    .bind(page_id)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(|e| database_failure("fetching page", &e, "Database error"))?
    .ok_or_else(not_found)?;

    let components = sqlx::query_as::<_, PageComponentRow>(
        r#"
        SELECT id, page_id, component_type, component_name, content_json, order_index, is_visible, theme
        FROM page_components
        WHERE page_id = $1
        ORDER BY order_index, id
        "#,
    )
    .bind(page_id)
    .fetch_all(pool.as_ref())
    .await
    .map_err(|e| database_failure("fetching page components", &e, "Database error"))?;

    Ok((
        StatusCode::OK,
        Json(PageDetailResponse {
            page,
            components: components.into_iter().map(ComponentRecord::from).collect(),
        }),
    ))
}

/// POST /api/Pages - Create page (auth required)
pub async fn create_page(
    headers: HeaderMap,
    Json(payload): Json<CreatePageRequest>,
) -> Result<impl IntoResponse, ApiFailure> {
    verify_auth(&headers)?;

    if payload.title.trim().is_empty() {
        return Err(bad_request("Title is required", None));
    }
    validate_slug(&payload.slug)?;

    let pool = require_pool()?;
    let is_homepage = payload.is_homepage.unwrap_or(false);

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| database_failure("starting transaction", &e, "Failed to create page"))?;

    // Only one page may be the homepage.
    if is_homepage {
        sqlx::query("UPDATE pages SET is_homepage = false, updated_at = now() WHERE is_homepage")
            .execute(&mut *tx)
            .await
            .map_err(|e| database_failure("clearing homepage", &e, "Failed to create page"))?;
    }

    let page = sqlx::query_as::<_, Page>(
        r#"
        INSERT INTO pages (title, slug, category_id, is_homepage, is_published, meta_title, meta_description, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now())
        RETURNING id, title, slug, category_id, is_homepage, is_published, meta_title, meta_description, created_at, updated_at
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.slug)
    .bind(payload.category_id)
    .bind(is_homepage)
    .bind(payload.is_published.unwrap_or(false))
    .bind(&payload.meta_title)
    .bind(&payload.meta_description)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| slug_conflict_or(e, "creating page", "Failed to create page"))?;

    tx.commit()
        .await
        .map_err(|e| database_failure("committing page", &e, "Failed to create page"))?;

    tracing::info!(id = page.id, slug = %page.slug, "page created");
    Ok((StatusCode::CREATED, Json(page)))
}

/// PUT /api/Pages/{id} - Update page (auth required)
pub async fn update_page(
    headers: HeaderMap,
    Path(page_id): Path<i64>,
    Json(payload): Json<UpdatePageRequest>,
) -> Result<impl IntoResponse, ApiFailure> {
    verify_auth(&headers)?;

    if let Some(title) = &payload.title {
        if title.trim().is_empty() {
            return Err(bad_request("Title is required", None));
        }
    }
    if let Some(slug) = &payload.slug {
        validate_slug(slug)?;
    }

    let pool = require_pool()?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| database_failure("starting transaction", &e, "Failed to update page"))?;

    let existing = sqlx::query_as::<_, Page>(
        "SELECT id, title, slug, category_id, is_homepage, is_published, meta_title, meta_description, created_at, updated_at FROM pages WHERE id = $1"
    )
    .bind(page_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| database_failure("fetching page", &e, "Database error"))?
    .ok_or_else(not_found)?;

    let title = payload.title.unwrap_or(existing.title);
    let slug = payload.slug.unwrap_or(existing.slug);
    let category_id = payload.category_id.or(existing.category_id);
    let is_homepage = payload.is_homepage.unwrap_or(existing.is_homepage);
    let is_published = payload.is_published.unwrap_or(existing.is_published);
    let meta_title = payload.meta_title.or(existing.meta_title);
    let meta_description = payload.meta_description.or(existing.meta_description);

    if is_homepage && !existing.is_homepage {
        sqlx::query(
            "UPDATE pages SET is_homepage = false, updated_at = now() WHERE is_homepage AND id <> $1",
        )
        .bind(page_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| database_failure("clearing homepage", &e, "Failed to update page"))?;
    }

    let page = sqlx::query_as::<_, Page>(
        r#"
        UPDATE pages
        SET title = $1, slug = $2, category_id = $3, is_homepage = $4, is_published = $5,
            meta_title = $6, meta_description = $7, updated_at = now()
        WHERE id = $8
        RETURNING id, title, slug, category_id, is_homepage, is_published, meta_title, meta_description, created_at, updated_at
        "#,
    )
    .bind(&title)
    .bind(&slug)
    .bind(category_id)
    .bind(is_homepage)
    .bind(is_published)
    .bind(&meta_title)
    .bind(&meta_description)
    .bind(page_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| slug_conflict_or(e, "updating page", "Failed to update page"))?;

    tx.commit()
        .await
        .map_err(|e| database_failure("committing page", &e, "Failed to update page"))?;

    Ok((StatusCode::OK, Json(page)))
}

/// DELETE /api/Pages/{id} - Delete page and its components (auth required)
pub async fn delete_page(
    headers: HeaderMap,
    Path(page_id): Path<i64>,
) -> Result<impl IntoResponse, ApiFailure> {
    verify_auth(&headers)?;
    let pool = require_pool()?;

    let result = sqlx::query("DELETE FROM pages WHERE id = $1")
        .bind(page_id)
        .execute(pool.as_ref())
        .await
        .map_err(|e| database_failure("deleting page", &e, "Failed to delete page"))?;

    if result.rows_affected() == 0 {
        return Err(not_found());
    }

    tracing::info!(id = page_id, "page deleted");
    Ok((StatusCode::OK, Json(SuccessResponse { success: true })))
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

    fn pages_router() -> Router {
        Router::new()
            .route("/api/Pages", get(list_pages).post(create_page))
            .route(
                "/api/Pages/{id}",
                get(get_page).put(update_page).delete(delete_page),
            )
    }

    async fn send(
        method: &str,
        uri: &str,
        json: Option<serde_json::Value>,
    ) -> (StatusCode, axum::body::Bytes) {
        let token = create_access_token(
            "op-1",
            "editor@example.com",
            "editor",
            chrono::Duration::hours(1),
        )
        .unwrap();
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", token));
        let req = match json {
            Some(value) => req
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&value).unwrap()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = pages_router().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    #[test]
    fn test_slug_validation() {
        assert!(is_valid_slug("about-us"));
        assert!(is_valid_slug("page2"));
        assert!(!is_valid_slug("About"));
        assert!(!is_valid_slug("double--dash"));
        assert!(!is_valid_slug("-leading"));
    }

    #[tokio::test]
    async fn test_create_page_rejects_invalid_slug() {
        let (status, bytes) = send(
            "POST",
            "/api/Pages",
            Some(serde_json::json!({ "title": "About", "slug": "About Us" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "Invalid slug");
    }

    #[tokio::test]
    async fn test_create_page_requires_title() {
        let (status, _) = send(
            "POST",
            "/api/Pages",
            Some(serde_json::json!({ "title": " ", "slug": "about" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_page_without_database_returns_unavailable() {
        let (status, _) = send("GET", "/api/Pages/3", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_update_page_rejects_invalid_slug_before_database() {
        let (status, _) = send(
            "PUT",
            "/api/Pages/3",
            Some(serde_json::json!({ "slug": "no_underscores" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
