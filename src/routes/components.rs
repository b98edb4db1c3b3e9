/**
 * Page Component Routes
 * Ordered, typed content blocks of a page
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::db::{self, models::PageComponentRow};
use crate::reconciler::api::{ORDER_INDEX_CONFLICT_CODE, ORDER_INDEX_CONSTRAINT};
use crate::reconciler::model::{validate_content_json, ComponentRecord, CreateComponentRequest};
use crate::routes::auth::verify_auth;
use crate::routes::{
    bad_request, database_failure, not_found, require_pool, ApiFailure, ErrorResponse,
    SuccessResponse,
};

// ============================================================================
// Validation
// ============================================================================

fn validate_component(
    component_type: &str,
    content_json: &str,
    order_index: i32,
) -> Result<(), ApiFailure> {
    if component_type.trim().is_empty() {
        return Err(bad_request("componentType is required", None));
    }
    if let Err(message) = validate_content_json(content_json) {
        return Err(bad_request("Invalid contentJson", Some(message)));
    }
    if order_index < 0 {
        return Err(bad_request("orderIndex must not be negative", None));
    }
    Ok(())
}

/// 409 body the reconciler recognises as a retryable ordering conflict.
fn order_conflict() -> ApiFailure {
    (
        StatusCode::CONFLICT,
        Json(ErrorResponse {
            error: "Order index already in use".to_string(),
            code: Some(ORDER_INDEX_CONFLICT_CODE.to_string()),
            message: Some(format!(
                "duplicate key value violates unique constraint \"{}\"",
                ORDER_INDEX_CONSTRAINT
            )),
        }),
    )
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_foreign_key_violation())
        .unwrap_or(false)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/Pages/{page_id}/components - Components of a page in render order
pub async fn list_components(Path(page_id): Path<i64>) -> Result<impl IntoResponse, ApiFailure> {
    let pool = require_pool()?;

    let rows = sqlx::query_as::<_, PageComponentRow>(
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
    .map_err(|e| database_failure("listing components", &e, "Failed to load components"))?;

    let items: Vec<ComponentRecord> = rows.into_iter().map(ComponentRecord::from).collect();
    Ok((StatusCode::OK, Json(items)))
}

/// POST /api/Pages/{page_id}/components - Create component (auth required)
pub async fn create_component(
    headers: HeaderMap,
    Path(page_id): Path<i64>,
    Json(payload): Json<CreateComponentRequest>,
) -> Result<impl IntoResponse, ApiFailure> {
    verify_auth(&headers)?;
    validate_component(
        &payload.component_type,
        &payload.content_json,
        payload.order_index,
    )?;
    if payload.page_id != page_id {
        return Err(bad_request("pageId does not match the route", None));
    }

    let pool = require_pool()?;

    let row = sqlx::query_as::<_, PageComponentRow>(
        r#"
        INSERT INTO page_components (page_id, component_type, component_name, content_json, order_index, is_visible, theme, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now())
        RETURNING id, page_id, component_type, component_name, content_json, order_index, is_visible, theme
        "#,
    )
    .bind(page_id)
    .bind(&payload.component_type)
    .bind(&payload.component_name)
    .bind(&payload.content_json)
    .bind(payload.order_index)
    .bind(payload.is_visible)
    .bind(i16::from(payload.theme))
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        if db::is_order_index_conflict(&e) {
            tracing::warn!(
                page_id,
                order_index = payload.order_index,
                "order index conflict on create"
            );
            return order_conflict();
        }
        if is_foreign_key_violation(&e) {
            return not_found();
        }
        database_failure("creating component", &e, "Failed to create component")
    })?;

    let record = ComponentRecord::from(row);
    tracing::info!(
        page_id,
        id = record.id,
        order_index = record.order_index,
        "component created"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /api/Pages/components/{id} and PUT /api/Components/{id} - Full update (auth required)
pub async fn update_component(
    headers: HeaderMap,
    Path(component_id): Path<i64>,
    Json(payload): Json<ComponentRecord>,
) -> Result<impl IntoResponse, ApiFailure> {
    verify_auth(&headers)?;
    validate_component(
        &payload.component_type,
        &payload.content_json,
        payload.order_index,
    )?;
    if payload.id != component_id {
        return Err(bad_request("id does not match the route", None));
    }

    let pool = require_pool()?;

    // page_id is immutable, so it takes part in the match rather than the SET.
    let row = sqlx::query_as::<_, PageComponentRow>(
        r#"
        UPDATE page_components
        SET component_type = $1, component_name = $2, content_json = $3, order_index = $4,
            is_visible = $5, theme = $6, updated_at = now()
        WHERE id = $7 AND page_id = $8
        RETURNING id, page_id, component_type, component_name, content_json, order_index, is_visible, theme
        "#,
    )
    .bind(&payload.component_type)
    .bind(&payload.component_name)
    .bind(&payload.content_json)
    .bind(payload.order_index)
    .bind(payload.is_visible)
    .bind(i16::from(payload.theme))
    .bind(component_id)
    .bind(payload.page_id)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(|e| {
        if db::is_order_index_conflict(&e) {
            tracing::warn!(
                id = component_id,
                order_index = payload.order_index,
                "order index conflict on update"
            );
            return order_conflict();
        }
        database_failure("updating component", &e, "Failed to update component")
    })?
    .ok_or_else(not_found)?;

    Ok((StatusCode::OK, Json(ComponentRecord::from(row))))
}

/// DELETE /api/Pages/components/{id} - Delete component (auth required)
pub async fn delete_component(
    headers: HeaderMap,
    Path(component_id): Path<i64>,
) -> Result<impl IntoResponse, ApiFailure> {
    verify_auth(&headers)?;
    let pool = require_pool()?;

    let result = sqlx::query("DELETE FROM page_components WHERE id = $1")
        .bind(component_id)
        .execute(pool.as_ref())
        .await
        .map_err(|e| database_failure("deleting component", &e, "Failed to delete component"))?;

    if result.rows_affected() == 0 {
        return Err(not_found());
    }

    tracing::info!(id = component_id, "component deleted");
    Ok((StatusCode::OK, Json(SuccessResponse { success: true })))
}
