//! In-memory [`ComponentApi`] that enforces `(pageId, orderIndex)` uniqueness
//! on every single write and records each call.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::api::{ApiError, ComponentApi, ORDER_INDEX_CONSTRAINT};
use super::model::{ComponentRecord, CreateComponentRequest, Theme};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    List(i64),
    Create { order_index: i32 },
    Update { id: i64, order_index: i32 },
    Delete(i64),
}

#[derive(Debug, Default)]
struct FakeState {
    rows: BTreeMap<i64, ComponentRecord>,
    next_id: i64,
    calls: Vec<Call>,
    forced_create_conflicts: u32,
    fail_creates: bool,
    fail_lists: bool,
    updates_before_failure: Option<usize>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeApi {
    state: Mutex<FakeState>,
}

pub(crate) fn record(id: i64, page_id: i64, order_index: i32) -> ComponentRecord {
    ComponentRecord {
        id,
        page_id,
        component_type: "Text".to_string(),
        component_name: Some(format!("block {}", id)),
        content_json: format!(r#"{{"body":"block {}"}}"#, id),
        order_index,
        is_visible: true,
        theme: Theme::Light,
    }
}

fn conflict() -> ApiError {
    ApiError::OrderConflict {
        message: format!(
            "duplicate key value violates unique constraint \"{}\"",
            ORDER_INDEX_CONSTRAINT
        ),
    }
}

impl FakeApi {
    /// Seeds rows as `(id, page_id, order_index)` without uniqueness checks,
    /// so tests can start from a corrupted page.
    pub(crate) fn with_rows(rows: &[(i64, i64, i32)]) -> Self {
        let api = Self::default();
        {
            let mut state = api.state.lock().unwrap();
            for &(id, page_id, order_index) in rows {
                state.rows.insert(id, record(id, page_id, order_index));
                state.next_id = state.next_id.max(id);
            }
        }
        api
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Server-side `(id, order_index)` pairs for a page, sorted by index.
    pub(crate) fn layout(&self, page_id: i64) -> Vec<(i64, i32)> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<(i64, i32)> = state
            .rows
            .values()
            .filter(|r| r.page_id == page_id)
            .map(|r| (r.id, r.order_index))
            .collect();
        rows.sort_by_key(|&(id, index)| (index, id));
        rows
    }

    pub(crate) fn row(&self, id: i64) -> Option<ComponentRecord> {
        self.state.lock().unwrap().rows.get(&id).cloned()
    }

    pub(crate) fn force_create_conflicts(&self, count: u32) {
        self.state.lock().unwrap().forced_create_conflicts = count;
    }

    pub(crate) fn fail_creates(&self) {
        self.state.lock().unwrap().fail_creates = true;
    }

    pub(crate) fn fail_lists(&self, fail: bool) {
        self.state.lock().unwrap().fail_lists = fail;
    }

    /// Lets `count` further updates succeed, then fails every update.
    pub(crate) fn fail_updates_after(&self, count: usize) {
        self.state.lock().unwrap().updates_before_failure = Some(count);
    }

    pub(crate) fn insert_row(&self, row: ComponentRecord) {
        let mut state = self.state.lock().unwrap();
        state.next_id = state.next_id.max(row.id);
        state.rows.insert(row.id, row);
    }
}

fn index_taken(state: &FakeState, page_id: i64, order_index: i32, except: Option<i64>) -> bool {
    state
        .rows
        .values()
        .any(|r| r.page_id == page_id && r.order_index == order_index && Some(r.id) != except)
}

#[async_trait]
impl ComponentApi for FakeApi {
    async fn list(&self, page_id: i64) -> Result<Vec<ComponentRecord>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::List(page_id));
        if state.fail_lists {
            return Err(ApiError::Transport("connection refused".to_string()));
        }
        Ok(state
            .rows
            .values()
            .filter(|r| r.page_id == page_id)
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        page_id: i64,
        request: &CreateComponentRequest,
    ) -> Result<ComponentRecord, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create {
            order_index: request.order_index,
        });
        if state.fail_creates {
            return Err(ApiError::Status {
                status: 500,
                message: "internal error".to_string(),
            });
        }
        if state.forced_create_conflicts > 0 {
            state.forced_create_conflicts -= 1;
            return Err(conflict());
        }
        if index_taken(&state, page_id, request.order_index, None) {
            return Err(conflict());
        }
        state.next_id += 1;
        let row = ComponentRecord {
            id: state.next_id,
            page_id,
            component_type: request.component_type.clone(),
            component_name: request.component_name.clone(),
            content_json: request.content_json.clone(),
            order_index: request.order_index,
            is_visible: request.is_visible,
            theme: request.theme,
        };
        state.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update(&self, component: &ComponentRecord) -> Result<ComponentRecord, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Update {
            id: component.id,
            order_index: component.order_index,
        });
        if let Some(remaining) = state.updates_before_failure {
            if remaining == 0 {
                return Err(ApiError::Transport("connection reset".to_string()));
            }
            state.updates_before_failure = Some(remaining - 1);
        }
        if !state.rows.contains_key(&component.id) {
            return Err(ApiError::Status {
                status: 404,
                message: "Not found".to_string(),
            });
        }
        if index_taken(
            &state,
            component.page_id,
            component.order_index,
            Some(component.id),
        ) {
            return Err(conflict());
        }
        state.rows.insert(component.id, component.clone());
        Ok(component.clone())
    }

    async fn delete(&self, component_id: i64) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Delete(component_id));
        match state.rows.remove(&component_id) {
            Some(_) => Ok(()),
            None => Err(ApiError::Status {
                status: 404,
                message: "Not found".to_string(),
            }),
        }
    }
}
