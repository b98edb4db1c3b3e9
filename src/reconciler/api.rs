//! Client side of the page-component REST contract.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use thiserror::Error;

use super::model::{ComponentRecord, CreateComponentRequest};

/// Machine-readable code the page-content service attaches to ordering conflicts.
pub const ORDER_INDEX_CONFLICT_CODE: &str = "ORDER_INDEX_CONFLICT";

/// Unique index guarding `(page_id, order_index)`.
pub const ORDER_INDEX_CONSTRAINT: &str = "IX_PageComponents_PageId_OrderIndex";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    #[error("order index already in use: {message}")]
    OrderConflict { message: String },

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_order_conflict(&self) -> bool {
        matches!(self, ApiError::OrderConflict { .. })
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

/// Maps a failed response onto an [`ApiError`].
///
/// The structured `code` wins. Backends that only report the raw database
/// message are recognised by the duplicate-key text naming the order index.
pub fn classify_error(status: u16, body: &str) -> ApiError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .or(parsed.error)
        .unwrap_or_else(|| body.trim().to_string());

    if parsed.code.as_deref() == Some(ORDER_INDEX_CONFLICT_CODE) {
        return ApiError::OrderConflict { message };
    }

    if matches!(status, 400 | 409) && is_legacy_order_conflict(body) {
        return ApiError::OrderConflict { message };
    }

    ApiError::Status { status, message }
}

fn is_legacy_order_conflict(text: &str) -> bool {
    text.contains("duplicate key")
        && (text.contains(ORDER_INDEX_CONSTRAINT) || text.contains("OrderIndex"))
}

/// Backend operations the reconciler depends on.
#[async_trait]
pub trait ComponentApi: Send + Sync {
    async fn list(&self, page_id: i64) -> Result<Vec<ComponentRecord>, ApiError>;

    async fn create(
        &self,
        page_id: i64,
        request: &CreateComponentRequest,
    ) -> Result<ComponentRecord, ApiError>;

    async fn update(&self, component: &ComponentRecord) -> Result<ComponentRecord, ApiError>;

    async fn delete(&self, component_id: i64) -> Result<(), ApiError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// Which path the update call uses. Some deployments only expose the
/// top-level `/Components/{id}` route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateRoute {
    #[default]
    PageComponents,
    Components,
}

impl UpdateRoute {
    fn path(self, component_id: i64) -> String {
        match self {
            UpdateRoute::PageComponents => format!("Pages/components/{}", component_id),
            UpdateRoute::Components => format!("Components/{}", component_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
    pub update_route: UpdateRoute,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("CMS_API_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:3001/api".to_string()),
            token: std::env::var("CMS_API_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout_secs: std::env::var("CMS_API_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            update_route: match std::env::var("CMS_UPDATE_ROUTE").as_deref() {
                Ok("components") => UpdateRoute::Components,
                _ => UpdateRoute::PageComponents,
            },
        }
    }
}

/// [`ComponentApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpComponentApi {
    client: Client,
    config: ApiConfig,
}

impl HttpComponentApi {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", "application/json");
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = self.authorized(request).send().await.map_err(|e| {
            tracing::error!(error = %e, "component api request failed");
            ApiError::Transport(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = classify_error(status.as_u16(), &body);
        tracing::warn!(status = %status, error = %error, "component api returned error");
        Err(error)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ComponentApi for HttpComponentApi {
    async fn list(&self, page_id: i64) -> Result<Vec<ComponentRecord>, ApiError> {
        let url = self.url(&format!("Pages/{}/components", page_id));
        self.send_json(self.client.get(url)).await
    }

    async fn create(
        &self,
        page_id: i64,
        request: &CreateComponentRequest,
    ) -> Result<ComponentRecord, ApiError> {
        let url = self.url(&format!("Pages/{}/components", page_id));
        self.send_json(self.client.post(url).json(request)).await
    }

    async fn update(&self, component: &ComponentRecord) -> Result<ComponentRecord, ApiError> {
        let url = self.url(&self.config.update_route.path(component.id));
        self.send_json(self.client.put(url).json(component)).await
    }

    async fn delete(&self, component_id: i64) -> Result<(), ApiError> {
        let url = self.url(&format!("Pages/components/{}", component_id));
        let response = self.send(self.client.delete(url)).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(());
        }
        // Acknowledgement bodies vary between backends and carry nothing we need.
        if let Err(e) = response.bytes().await {
            tracing::debug!(component_id, error = %e, "delete acknowledged, body unreadable");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_code_is_a_conflict() {
        let body = r#"{"error":"Order index already in use","code":"ORDER_INDEX_CONFLICT"}"#;
        let err = classify_error(409, body);
        assert!(err.is_order_conflict());
    }

    #[test]
    fn test_legacy_duplicate_key_message_is_a_conflict() {
        let body = r#"{"message":"Cannot insert duplicate key row in object 'dbo.PageComponents' with unique index 'IX_PageComponents_PageId_OrderIndex'."}"#;
        let err = classify_error(400, body);
        assert!(err.is_order_conflict());
        assert!(err.to_string().contains("IX_PageComponents_PageId_OrderIndex"));
    }

    #[test]
    fn test_legacy_plain_text_conflict() {
        let err = classify_error(
            400,
            "duplicate key value violates unique constraint \"IX_PageComponents_PageId_OrderIndex\"",
        );
        assert!(err.is_order_conflict());
    }

    #[test]
    fn test_other_duplicate_key_is_not_an_order_conflict() {
        let err = classify_error(400, r#"{"message":"duplicate key on IX_Pages_Slug"}"#);
        assert_eq!(
            err,
            ApiError::Status {
                status: 400,
                message: "duplicate key on IX_Pages_Slug".to_string()
            }
        );
    }

    #[test]
    fn test_server_error_with_conflict_text_is_not_retried() {
        let err = classify_error(500, "duplicate key IX_PageComponents_PageId_OrderIndex");
        assert!(!err.is_order_conflict());
    }

    #[test]
    fn test_update_route_paths() {
        assert_eq!(UpdateRoute::PageComponents.path(4), "Pages/components/4");
        assert_eq!(UpdateRoute::Components.path(4), "Components/4");
    }

    async fn local_backend() -> HttpComponentApi {
        use axum::{extract::Path, http::StatusCode as Status, routing::delete, Json, Router};

        let app = Router::new().route(
            "/api/Pages/components/{id}",
            delete(|Path(id): Path<i64>| async move {
                match id {
                    1 => (Status::OK, Json(serde_json::json!({ "success": true }))),
                    2 => (Status::NO_CONTENT, Json(serde_json::Value::Null)),
                    _ => (Status::NOT_FOUND, Json(serde_json::json!({ "error": "Not found" }))),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        HttpComponentApi::new(ApiConfig {
            base_url: format!("http://{}/api", addr),
            token: Some("token".to_string()),
            timeout_secs: 5,
            update_route: UpdateRoute::PageComponents,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_delete_accepts_any_success_acknowledgement() {
        let api = local_backend().await;

        assert_eq!(api.delete(1).await, Ok(()));
        assert_eq!(api.delete(2).await, Ok(()));
        assert_eq!(
            api.delete(3).await,
            Err(ApiError::Status {
                status: 404,
                message: "Not found".to_string()
            })
        );
    }

    #[test]
    fn test_url_joins_base_without_double_slash() {
        let api = HttpComponentApi::new(ApiConfig {
            base_url: "http://localhost:3001/api/".to_string(),
            token: None,
            timeout_secs: 5,
            update_route: UpdateRoute::PageComponents,
        })
        .unwrap();
        assert_eq!(
            api.url("Pages/3/components"),
            "http://localhost:3001/api/Pages/3/components"
        );
    }
}
