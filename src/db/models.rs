//! Database Models - rows as sqlx reads them, and their API shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::reconciler::model::{ComponentRecord, Theme};

/// Page row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub category_id: Option<i64>,
    pub is_homepage: bool,
    pub is_published: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Page component row
#[derive(Debug, Clone, FromRow)]
pub struct PageComponentRow {
    pub id: i64,
    pub page_id: i64,
    pub component_type: String,
    pub component_name: Option<String>,
    pub content_json: String,
    pub order_index: i32,
    pub is_visible: bool,
    pub theme: i16,
}

impl From<PageComponentRow> for ComponentRecord {
    fn from(row: PageComponentRow) -> Self {
        Self {
            id: row.id,
            page_id: row.page_id,
            component_type: row.component_type,
            component_name: row.component_name,
            content_json: row.content_json,
            order_index: row.order_index,
            is_visible: row.is_visible,
            // The column only ever receives values written through `Theme`.
            theme: Theme::try_from(row.theme).unwrap_or_default(),
        }
    }
}

/// Site setting row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SiteSetting {
    pub section: String,
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
