/*!
 * Component Order Reconciler
 * Keeps one page's ordered component list in step with the page-content
 * backend, which rejects any single write that would give two components of
 * the same page the same order index.
 */
pub mod api;
pub mod editor;
pub mod error;
pub mod model;
pub mod ordering;

#[cfg(test)]
pub(crate) mod testing;

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;

pub use api::{ApiConfig, ApiError, ComponentApi, HttpComponentApi, UpdateRoute};
pub use editor::PageEditor;
pub use error::ReconcileError;
pub use model::{
    ComponentDraft, ComponentId, ComponentPatch, ComponentRecord, CreateComponentRequest,
    PageComponent, Theme,
};

use ordering::{
    has_duplicate_indices, lowest_free_index, next_order_index, normalize, quarantine_base,
};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Create calls Add makes before giving up on an ordering conflict.
    pub max_create_attempts: u32,
    /// Distance between the highest live index and the parking range used
    /// by two-phase order rewrites.
    pub quarantine_offset: i32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_create_attempts: 3,
            quarantine_offset: 1000,
        }
    }
}

/// State container for the components of one open page.
///
/// Every change to the local list is published on a watch channel before the
/// matching request goes out, so observers see optimistic state immediately.
pub struct PageReconciler {
    api: Arc<dyn ComponentApi>,
    page_id: i64,
    config: ReconcilerConfig,
    components: Vec<PageComponent>,
    /// Last order index the server confirmed for each component. Differs from
    /// the local view after a load that normalized duplicates locally.
    server_index: HashMap<i64, i32>,
    state_tx: watch::Sender<Vec<PageComponent>>,
    temp_seq: u64,
}

impl PageReconciler {
    pub fn new(api: Arc<dyn ComponentApi>, page_id: i64, config: ReconcilerConfig) -> Self {
        let (state_tx, _) = watch::channel(Vec::new());
        Self {
            api,
            page_id,
            config,
            components: Vec::new(),
            server_index: HashMap::new(),
            state_tx,
            temp_seq: 0,
        }
    }

    pub fn page_id(&self) -> i64 {
        self.page_id
    }

    /// Current local view, ordered by index.
    pub fn components(&self) -> &[PageComponent] {
        &self.components
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<PageComponent>> {
        self.state_tx.subscribe()
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Fetches the page's components. Duplicate indices are repaired in the
    /// local copy only. On failure the previous list is kept.
    #[tracing::instrument(skip(self), fields(page_id = self.page_id))]
    pub async fn load(&mut self) -> Result<Vec<PageComponent>, ReconcileError> {
        let records = self.api.list(self.page_id).await.map_err(|e| {
            tracing::warn!(error = %e, "failed to load components");
            ReconcileError::Load(e)
        })?;
        let confirmed: HashMap<i64, i32> =
            records.iter().map(|r| (r.id, r.order_index)).collect();

        let records = if has_duplicate_indices(&records) {
            tracing::warn!(
                count = records.len(),
                "duplicate order indices on page, normalizing local copy"
            );
            normalize(records)
        } else {
            records
        };

        self.components = records.into_iter().map(PageComponent::from).collect();
        self.server_index = confirmed;
        self.publish();
        tracing::debug!(count = self.components.len(), "components loaded");
        Ok(self.components.clone())
    }

    /// Appends a component at `max + 1`, retrying through a page repair when
    /// the backend reports an ordering conflict.
    #[tracing::instrument(skip(self, draft), fields(page_id = self.page_id, component_type = %draft.component_type))]
    pub async fn add(&mut self, draft: ComponentDraft) -> Result<PageComponent, ReconcileError> {
        draft.validate().map_err(ReconcileError::Validation)?;

        let next = match self.api.list(self.page_id).await {
            Ok(records) => next_order_index(&records),
            Err(e) => {
                tracing::warn!(error = %e, "re-fetch before add failed, using local state");
                next_order_index(&self.components)
            }
        };
        let mut order_index = next.ok_or_else(|| self.index_overflow())?;

        let temp_id = self.next_temp_id();
        self.components.push(PageComponent::pending(
            temp_id.clone(),
            self.page_id,
            &draft,
            order_index,
        ));
        self.publish();

        let attempts = self.config.max_create_attempts.max(1);
        for attempt in 1..=attempts {
            let request = draft.to_create_request(self.page_id, order_index);
            match self.api.create(self.page_id, &request).await {
                Ok(record) => {
                    tracing::info!(
                        id = record.id,
                        order_index = record.order_index,
                        attempt,
                        "component created"
                    );
                    self.confirm_pending(&temp_id, record.clone());
                    return Ok(PageComponent::from(record));
                }
                Err(e) if e.is_order_conflict() => {
                    tracing::warn!(attempt, order_index, "order index conflict on create");
                    if attempt == attempts {
                        break;
                    }
                    let next = match self.repair_remote().await {
                        Ok(records) => next_order_index(&records),
                        Err(e) => {
                            self.drop_pending(&temp_id);
                            return Err(e);
                        }
                    };
                    let Some(next) = next else {
                        self.drop_pending(&temp_id);
                        return Err(self.index_overflow());
                    };
                    order_index = next;
                    self.move_pending(&temp_id, order_index);
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to create component");
                    self.drop_pending(&temp_id);
                    return Err(ReconcileError::Network(e));
                }
            }
        }

        self.drop_pending(&temp_id);
        Err(ReconcileError::ConflictExceeded { attempts })
    }

    /// Applies `patch` to a confirmed component. An outgoing index already
    /// held by another component, locally or on the server, is swapped for
    /// the lowest free one.
    #[tracing::instrument(skip(self, patch), fields(page_id = self.page_id))]
    pub async fn update(
        &mut self,
        id: i64,
        patch: ComponentPatch,
    ) -> Result<PageComponent, ReconcileError> {
        let target = ComponentId::Confirmed(id);
        let current = self
            .components
            .iter()
            .find(|c| c.id == target)
            .and_then(PageComponent::to_record)
            .ok_or_else(|| ReconcileError::NotFound(target.clone()))?;

        patch.validate().map_err(ReconcileError::Validation)?;
        let mut next = patch.apply(&current);

        if self.server_index.get(&id) != Some(&next.order_index) {
            let taken: Vec<i32> = self
                .components
                .iter()
                .filter(|c| c.id != target)
                .map(|c| c.order_index)
                .chain(
                    self.server_index
                        .iter()
                        .filter(|(other, _)| **other != id)
                        .map(|(_, index)| *index),
                )
                .collect();
            if taken.contains(&next.order_index) {
                let free = lowest_free_index(&taken);
                tracing::debug!(
                    requested = next.order_index,
                    substituted = free,
                    "requested order index in use"
                );
                next.order_index = free;
            }
        }

        match self.api.update(&next).await {
            Ok(record) => {
                self.server_index.insert(record.id, record.order_index);
                self.replace_confirmed(record.clone());
                self.publish();
                Ok(PageComponent::from(record))
            }
            Err(e) if e.is_order_conflict() => {
                tracing::warn!(error = %e, "update rejected with order conflict");
                Err(ReconcileError::OrderConflict(e))
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to update component");
                Err(ReconcileError::Network(e))
            }
        }
    }

    /// Deletes a component once the backend confirms. Remaining indices are
    /// left as they are.
    #[tracing::instrument(skip(self), fields(page_id = self.page_id))]
    pub async fn delete(&mut self, id: ComponentId) -> Result<(), ReconcileError> {
        if !self.components.iter().any(|c| c.id == id) {
            return Err(ReconcileError::NotFound(id));
        }
        let Some(server_id) = id.confirmed() else {
            return Err(ReconcileError::Validation(
                "component is still being created".to_string(),
            ));
        };

        self.api.delete(server_id).await.map_err(|e| {
            tracing::error!(error = %e, "failed to delete component");
            ReconcileError::Network(e)
        })?;

        self.components.retain(|c| c.id != id);
        self.server_index.remove(&server_id);
        self.publish();
        tracing::info!("component deleted");
        Ok(())
    }

    /// Applies a full new ordering locally, then persists it in two phases:
    /// every moving component is parked in a range no live index uses, and
    /// only then written to its final position.
    #[tracing::instrument(skip(self, order), fields(page_id = self.page_id, count = order.len()))]
    pub async fn reorder(
        &mut self,
        order: &[ComponentId],
    ) -> Result<Vec<PageComponent>, ReconcileError> {
        let current: Vec<ComponentRecord> = self
            .components
            .iter()
            .filter_map(PageComponent::to_record)
            .collect();
        let target = self.plan_order(&current, order)?;

        let previous = std::mem::take(&mut self.components);
        self.components = target.iter().cloned().map(PageComponent::from).collect();
        self.publish();

        if let Err(e) = self.write_order(&target).await {
            tracing::warn!(error = %e, "reorder failed, reloading from server");
            if let Err(reload) = self.load().await {
                tracing::error!(error = %reload, "reload after failed reorder failed");
                self.components = previous;
                self.publish();
            }
            return Err(e);
        }

        tracing::info!("components reordered");
        Ok(self.components.clone())
    }

    /// Renumbers the page on the server to canonical order and adopts the
    /// result locally.
    #[tracing::instrument(skip(self), fields(page_id = self.page_id))]
    pub async fn repair(&mut self) -> Result<Vec<PageComponent>, ReconcileError> {
        self.repair_remote().await?;
        Ok(self.components.clone())
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn plan_order(
        &self,
        current: &[ComponentRecord],
        order: &[ComponentId],
    ) -> Result<Vec<ComponentRecord>, ReconcileError> {
        if self.components.iter().any(PageComponent::is_pending) {
            return Err(ReconcileError::Validation(
                "cannot reorder while a component is being created".to_string(),
            ));
        }
        if order.len() != current.len() {
            return Err(ReconcileError::Validation(format!(
                "new order lists {} components, page has {}",
                order.len(),
                current.len()
            )));
        }

        let by_id: HashMap<i64, &ComponentRecord> = current.iter().map(|r| (r.id, r)).collect();
        let mut seen = HashSet::with_capacity(order.len());
        let mut target = Vec::with_capacity(order.len());
        for (position, id) in order.iter().enumerate() {
            let record = id
                .confirmed()
                .and_then(|server_id| by_id.get(&server_id))
                .ok_or_else(|| ReconcileError::NotFound(id.clone()))?;
            if !seen.insert(record.id) {
                return Err(ReconcileError::Validation(format!(
                    "component {} appears twice in the new order",
                    record.id
                )));
            }
            let mut record = (*record).clone();
            record.order_index = position as i32;
            target.push(record);
        }
        Ok(target)
    }

    /// Moves the server from its last confirmed indices to `target` without
    /// any single write landing on an index another row still holds.
    async fn write_order(&mut self, target: &[ComponentRecord]) -> Result<(), ReconcileError> {
        let moving: Vec<&ComponentRecord> = target
            .iter()
            .filter(|r| self.server_index.get(&r.id) != Some(&r.order_index))
            .collect();
        if moving.is_empty() {
            return Ok(());
        }

        let base = quarantine_base(
            self.server_index
                .values()
                .copied()
                .chain(target.iter().map(|r| r.order_index)),
            target.len(),
            self.config.quarantine_offset,
        )
        .ok_or_else(|| self.index_overflow())?;
        tracing::debug!(moving = moving.len(), base, "parking components before final write");

        for (slot, record) in moving.iter().enumerate() {
            let mut parked = (*record).clone();
            // `base + target.len()` fits, and `slot < target.len()`.
            parked.order_index = base + slot as i32;
            self.api
                .update(&parked)
                .await
                .map_err(ReconcileError::Network)?;
            self.server_index.insert(parked.id, parked.order_index);
        }
        for record in &moving {
            self.api
                .update(record)
                .await
                .map_err(ReconcileError::Network)?;
            self.server_index.insert(record.id, record.order_index);
        }
        Ok(())
    }

    /// Re-fetches the page, normalizes it and writes the new indices back.
    async fn repair_remote(&mut self) -> Result<Vec<ComponentRecord>, ReconcileError> {
        let current = self
            .api
            .list(self.page_id)
            .await
            .map_err(ReconcileError::Network)?;
        self.server_index = current.iter().map(|r| (r.id, r.order_index)).collect();
        let target = normalize(current);
        self.write_order(&target).await?;
        tracing::info!(count = target.len(), "page order normalized");

        let pending: Vec<PageComponent> = self
            .components
            .drain(..)
            .filter(PageComponent::is_pending)
            .collect();
        self.components = target.iter().cloned().map(PageComponent::from).collect();
        self.components.extend(pending);
        self.publish();
        Ok(target)
    }

    fn index_overflow(&self) -> ReconcileError {
        tracing::warn!(page_id = self.page_id, "order index space exhausted");
        ReconcileError::IndexOverflow {
            page_id: self.page_id,
        }
    }

    fn next_temp_id(&mut self) -> String {
        self.temp_seq += 1;
        format!("temp-{}-{}", Utc::now().timestamp_millis(), self.temp_seq)
    }

    fn confirm_pending(&mut self, temp_id: &str, record: ComponentRecord) {
        self.components
            .retain(|c| !matches!(&c.id, ComponentId::Pending(t) if t == temp_id));
        self.server_index.insert(record.id, record.order_index);
        self.components.push(PageComponent::from(record));
        self.publish();
    }

    fn move_pending(&mut self, temp_id: &str, order_index: i32) {
        for component in &mut self.components {
            if matches!(&component.id, ComponentId::Pending(t) if t == temp_id) {
                component.order_index = order_index;
            }
        }
        self.publish();
    }

    fn drop_pending(&mut self, temp_id: &str) {
        self.components
            .retain(|c| !matches!(&c.id, ComponentId::Pending(t) if t == temp_id));
        self.publish();
    }

    fn replace_confirmed(&mut self, record: ComponentRecord) {
        let id = ComponentId::Confirmed(record.id);
        match self.components.iter_mut().find(|c| c.id == id) {
            Some(slot) => *slot = PageComponent::from(record),
            None => self.components.push(PageComponent::from(record)),
        }
    }

    fn publish(&mut self) {
        self.components
            .sort_by_cached_key(|c| (c.order_index, c.id.clone()));
        self.state_tx.send_replace(self.components.clone());
    }
}
