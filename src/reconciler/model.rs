//! Page component types shared by the reconciler and the page-content routes.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ============================================================================
// Identity
// ============================================================================

/// Identity of a component in the local view.
///
/// A component inserted optimistically carries a `Pending` placeholder until
/// the backend answers with its real id. Variant order matters: confirmed
/// components sort ahead of pending ones on an index tie.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentId {
    Confirmed(i64),
    Pending(String),
}

impl ComponentId {
    pub fn is_pending(&self) -> bool {
        matches!(self, ComponentId::Pending(_))
    }

    pub fn confirmed(&self) -> Option<i64> {
        match self {
            ComponentId::Confirmed(id) => Some(*id),
            ComponentId::Pending(_) => None,
        }
    }
}

impl From<i64> for ComponentId {
    fn from(id: i64) -> Self {
        ComponentId::Confirmed(id)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentId::Confirmed(id) => write!(f, "{}", id),
            ComponentId::Pending(temp) => write!(f, "{}", temp),
        }
    }
}

// ============================================================================
// Theme
// ============================================================================

/// Component-local colour scheme, stored as a small integer (1 = light, 2 = dark).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl TryFrom<i16> for Theme {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Theme::Light),
            2 => Ok(Theme::Dark),
            other => Err(format!("unknown theme {} (expected 1 or 2)", other)),
        }
    }
}

impl From<Theme> for i16 {
    fn from(theme: Theme) -> Self {
        match theme {
            Theme::Light => 1,
            Theme::Dark => 2,
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// A page component as the backend stores and returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    pub id: i64,
    pub page_id: i64,
    pub component_type: String,
    #[serde(default)]
    pub component_name: Option<String>,
    pub content_json: String,
    pub order_index: i32,
    #[serde(default = "default_visible", deserialize_with = "visibility_flag")]
    pub is_visible: bool,
    #[serde(default)]
    pub theme: Theme,
}

/// Body of `POST /Pages/{pageId}/components`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateComponentRequest {
    pub page_id: i64,
    pub component_type: String,
    #[serde(default)]
    pub component_name: Option<String>,
    pub content_json: String,
    pub order_index: i32,
    #[serde(default = "default_visible", deserialize_with = "visibility_flag")]
    pub is_visible: bool,
    #[serde(default)]
    pub theme: Theme,
}

fn default_visible() -> bool {
    true
}

/// Older backends send visibility as 0/1.
fn visibility_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(n) => Ok(n != 0),
    }
}

/// Checks that a content payload is a serialized JSON object.
pub fn validate_content_json(content: &str) -> Result<(), String> {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(serde_json::Value::Object(_)) => Ok(()),
        Ok(_) => Err("contentJson must be a JSON object".to_string()),
        Err(e) => Err(format!("contentJson is not valid JSON: {}", e)),
    }
}

// ============================================================================
// Local view
// ============================================================================

/// One entry of the reconciler's ordered component list.
#[derive(Debug, Clone, PartialEq)]
pub struct PageComponent {
    pub id: ComponentId,
    pub page_id: i64,
    pub component_type: String,
    pub component_name: Option<String>,
    pub content_json: String,
    pub order_index: i32,
    pub is_visible: bool,
    pub theme: Theme,
}

impl PageComponent {
    pub(crate) fn pending(
        temp_id: String,
        page_id: i64,
        draft: &ComponentDraft,
        order_index: i32,
    ) -> Self {
        Self {
            id: ComponentId::Pending(temp_id),
            page_id,
            component_type: draft.component_type.clone(),
            component_name: draft.component_name.clone(),
            content_json: draft.content_json.clone(),
            order_index,
            is_visible: draft.is_visible,
            theme: draft.theme,
        }
    }

    /// True while the create request for this component is in flight.
    pub fn is_pending(&self) -> bool {
        self.id.is_pending()
    }

    /// The backend shape of this component, or `None` while it is pending.
    pub fn to_record(&self) -> Option<ComponentRecord> {
        let id = self.id.confirmed()?;
        Some(ComponentRecord {
            id,
            page_id: self.page_id,
            component_type: self.component_type.clone(),
            component_name: self.component_name.clone(),
            content_json: self.content_json.clone(),
            order_index: self.order_index,
            is_visible: self.is_visible,
            theme: self.theme,
        })
    }
}

impl From<ComponentRecord> for PageComponent {
    fn from(record: ComponentRecord) -> Self {
        Self {
            id: ComponentId::Confirmed(record.id),
            page_id: record.page_id,
            component_type: record.component_type,
            component_name: record.component_name,
            content_json: record.content_json,
            order_index: record.order_index,
            is_visible: record.is_visible,
            theme: record.theme,
        }
    }
}

// ============================================================================
// Drafts and patches
// ============================================================================

/// A component the operator is about to add. The order index is chosen by
/// the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDraft {
    pub component_type: String,
    pub component_name: Option<String>,
    pub content_json: String,
    pub is_visible: bool,
    pub theme: Theme,
}

impl ComponentDraft {
    pub fn new(component_type: impl Into<String>, content_json: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            component_name: None,
            content_json: content_json.into(),
            is_visible: true,
            theme: Theme::Light,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.component_name = Some(name.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.component_type.trim().is_empty() {
            return Err("componentType is required".to_string());
        }
        validate_content_json(&self.content_json)
    }

    pub(crate) fn to_create_request(&self, page_id: i64, order_index: i32) -> CreateComponentRequest {
        CreateComponentRequest {
            page_id,
            component_type: self.component_type.clone(),
            component_name: self.component_name.clone(),
            content_json: self.content_json.clone(),
            order_index,
            is_visible: self.is_visible,
            theme: self.theme,
        }
    }
}

/// Partial edit of a component. Unset fields keep their last-known value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentPatch {
    pub component_type: Option<String>,
    pub component_name: Option<String>,
    pub content_json: Option<String>,
    pub order_index: Option<i32>,
    pub is_visible: Option<bool>,
    pub theme: Option<Theme>,
}

impl ComponentPatch {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(component_type) = &self.component_type {
            if component_type.trim().is_empty() {
                return Err("componentType is required".to_string());
            }
        }
        if let Some(content) = &self.content_json {
            validate_content_json(content)?;
        }
        if let Some(index) = self.order_index {
            if index < 0 {
                return Err("orderIndex must not be negative".to_string());
            }
        }
        Ok(())
    }

    /// Merges the patch onto `base`, producing a fully populated record.
    pub fn apply(&self, base: &ComponentRecord) -> ComponentRecord {
        ComponentRecord {
            id: base.id,
            page_id: base.page_id,
            component_type: self
                .component_type
                .clone()
                .unwrap_or_else(|| base.component_type.clone()),
            component_name: self
                .component_name
                .clone()
                .or_else(|| base.component_name.clone()),
            content_json: self
                .content_json
                .clone()
                .unwrap_or_else(|| base.content_json.clone()),
            order_index: self.order_index.unwrap_or(base.order_index),
            is_visible: self.is_visible.unwrap_or(base.is_visible),
            theme: self.theme.unwrap_or(base.theme),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ComponentRecord {
        ComponentRecord {
            id: 7,
            page_id: 1,
            component_type: "Hero".to_string(),
            component_name: Some("Top banner".to_string()),
            content_json: r#"{"title":"Hello"}"#.to_string(),
            order_index: 3,
            is_visible: true,
            theme: Theme::Dark,
        }
    }

    #[test]
    fn test_record_accepts_legacy_integer_visibility() {
        let json = r#"{"id":1,"pageId":2,"componentType":"Text","contentJson":"{}","orderIndex":0,"isVisible":0,"theme":2}"#;
        let record: ComponentRecord = serde_json::from_str(json).unwrap();
        assert!(!record.is_visible);
        assert_eq!(record.theme, Theme::Dark);
        assert_eq!(record.component_name, None);
    }

    #[test]
    fn test_record_serializes_camel_case_with_numeric_theme() {
        let value = serde_json::to_value(record()).unwrap();
        assert_eq!(value["pageId"], 1);
        assert_eq!(value["orderIndex"], 3);
        assert_eq!(value["theme"], 2);
        assert_eq!(value["isVisible"], true);
    }

    #[test]
    fn test_unknown_theme_is_rejected() {
        let json = r#"{"id":1,"pageId":2,"componentType":"Text","contentJson":"{}","orderIndex":0,"theme":3}"#;
        assert!(serde_json::from_str::<ComponentRecord>(json).is_err());
    }

    #[test]
    fn test_draft_validation() {
        assert!(ComponentDraft::new("Hero", r#"{"a":1}"#).validate().is_ok());
        assert!(ComponentDraft::new("  ", "{}").validate().is_err());
        assert!(ComponentDraft::new("Hero", "{not json").validate().is_err());
        assert!(ComponentDraft::new("Hero", "[1,2]").validate().is_err());
    }

    #[test]
    fn test_patch_keeps_unset_fields() {
        let patch = ComponentPatch {
            component_name: Some("Renamed".to_string()),
            ..Default::default()
        };
        let merged = patch.apply(&record());
        assert_eq!(merged.component_name.as_deref(), Some("Renamed"));
        assert_eq!(merged.component_type, "Hero");
        assert_eq!(merged.content_json, r#"{"title":"Hello"}"#);
        assert_eq!(merged.order_index, 3);
        assert_eq!(merged.theme, Theme::Dark);
    }

    #[test]
    fn test_pending_ids_sort_after_confirmed() {
        let mut ids = vec![
            ComponentId::Pending("temp-1".to_string()),
            ComponentId::Confirmed(9),
            ComponentId::Confirmed(2),
        ];
        ids.sort();
        assert_eq!(ids[0], ComponentId::Confirmed(2));
        assert!(ids[2].is_pending());
    }
}
