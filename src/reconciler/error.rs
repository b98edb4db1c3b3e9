use thiserror::Error;

use super::api::ApiError;
use super::model::ComponentId;

/// Errors surfaced by reconciler operations.
///
/// Each one is scoped to the single operation that produced it; local state
/// is left matching some valid server state.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("failed to load components: {0}")]
    Load(ApiError),

    #[error("order index conflict persisted after {attempts} attempts")]
    ConflictExceeded { attempts: u32 },

    #[error("invalid component: {0}")]
    Validation(String),

    #[error("component {0} not found")]
    NotFound(ComponentId),

    /// An update collided on the order index despite local conflict
    /// avoidance. `repair` renumbers the page.
    #[error("order index conflict: {0}")]
    OrderConflict(ApiError),

    #[error(transparent)]
    Network(ApiError),

    /// The next index, or the parking range a rewrite needs, would not fit
    /// in an `i32`.
    #[error("order indices on page {page_id} are out of range")]
    IndexOverflow { page_id: i64 },

    #[error("page editor is closed")]
    EditorClosed,
}
