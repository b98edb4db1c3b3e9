//! Per-page single-writer handle around [`PageReconciler`].
//!
//! All mutations for one open page go through one task, so an add and a
//! delete fired from the UI at the same moment are applied one after the
//! other instead of racing on the component list.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::api::ComponentApi;
use super::error::ReconcileError;
use super::model::{ComponentDraft, ComponentId, ComponentPatch, PageComponent};
use super::{PageReconciler, ReconcilerConfig};

type Reply<T> = oneshot::Sender<Result<T, ReconcileError>>;

/// Commands sent to the editor task.
enum EditorCommand {
    Load(Reply<Vec<PageComponent>>),
    Add {
        draft: ComponentDraft,
        response: Reply<PageComponent>,
    },
    Update {
        id: i64,
        patch: ComponentPatch,
        response: Reply<PageComponent>,
    },
    Delete {
        id: ComponentId,
        response: Reply<()>,
    },
    Reorder {
        order: Vec<ComponentId>,
        response: Reply<Vec<PageComponent>>,
    },
    Repair(Reply<Vec<PageComponent>>),
    Close,
}

/// Handle to the component editor of one open page.
pub struct PageEditor {
    page_id: i64,
    command_tx: mpsc::UnboundedSender<EditorCommand>,
    state_rx: watch::Receiver<Vec<PageComponent>>,
    handle: JoinHandle<()>,
}

impl PageEditor {
    /// Spawns the editor task for `page_id`. Must be called inside a tokio runtime.
    pub fn open(api: Arc<dyn ComponentApi>, page_id: i64, config: ReconcilerConfig) -> Self {
        let reconciler = PageReconciler::new(api, page_id, config);
        let state_rx = reconciler.subscribe();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(reconciler, command_rx));
        tracing::debug!(page_id, "page editor opened");

        Self {
            page_id,
            command_tx,
            state_rx,
            handle,
        }
    }

    pub fn page_id(&self) -> i64 {
        self.page_id
    }

    /// Latest published component list, including optimistic entries.
    pub fn snapshot(&self) -> Vec<PageComponent> {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<PageComponent>> {
        self.state_rx.clone()
    }

    pub async fn load(&self) -> Result<Vec<PageComponent>, ReconcileError> {
        self.request(EditorCommand::Load).await
    }

    pub async fn add(&self, draft: ComponentDraft) -> Result<PageComponent, ReconcileError> {
        self.request(|response| EditorCommand::Add { draft, response })
            .await
    }

    pub async fn update(
        &self,
        id: i64,
        patch: ComponentPatch,
    ) -> Result<PageComponent, ReconcileError> {
        self.request(|response| EditorCommand::Update {
            id,
            patch,
            response,
        })
        .await
    }

    pub async fn delete(&self, id: ComponentId) -> Result<(), ReconcileError> {
        self.request(|response| EditorCommand::Delete { id, response })
            .await
    }

    pub async fn reorder(
        &self,
        order: Vec<ComponentId>,
    ) -> Result<Vec<PageComponent>, ReconcileError> {
        self.request(|response| EditorCommand::Reorder { order, response })
            .await
    }

    pub async fn repair(&self) -> Result<Vec<PageComponent>, ReconcileError> {
        self.request(EditorCommand::Repair).await
    }

    /// Stops the editor task after the commands already queued have run.
    pub async fn close(self) {
        let _ = self.command_tx.send(EditorCommand::Close);
        if let Err(e) = self.handle.await {
            tracing::warn!(
                page_id = self.page_id,
                error = %e,
                "page editor task ended abnormally"
            );
        }
        tracing::debug!(page_id = self.page_id, "page editor closed");
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> EditorCommand,
    ) -> Result<T, ReconcileError> {
        let (response, reply) = oneshot::channel();
        self.command_tx
            .send(build(response))
            .map_err(|_| ReconcileError::EditorClosed)?;
        reply.await.map_err(|_| ReconcileError::EditorClosed)?
    }
}

async fn run(
    mut reconciler: PageReconciler,
    mut commands: mpsc::UnboundedReceiver<EditorCommand>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            EditorCommand::Load(response) => {
                let _ = response.send(reconciler.load().await);
            }
            EditorCommand::Add { draft, response } => {
                let _ = response.send(reconciler.add(draft).await);
            }
            EditorCommand::Update {
                id,
                patch,
                response,
            } => {
                let _ = response.send(reconciler.update(id, patch).await);
            }
            EditorCommand::Delete { id, response } => {
                let _ = response.send(reconciler.delete(id).await);
            }
            EditorCommand::Reorder { order, response } => {
                let _ = response.send(reconciler.reorder(&order).await);
            }
            EditorCommand::Repair(response) => {
                let _ = response.send(reconciler.repair().await);
            }
            EditorCommand::Close => break,
        }
    }
    commands.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::testing::FakeApi;

    const PAGE: i64 = 4;

    fn cid(id: i64) -> ComponentId {
        ComponentId::Confirmed(id)
    }

    fn draft(body: &str) -> ComponentDraft {
        ComponentDraft::new("Text", format!(r#"{{"body":"{}"}}"#, body))
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_serialized() {
        let api = Arc::new(FakeApi::default());
        let editor = PageEditor::open(api.clone(), PAGE, ReconcilerConfig::default());
        editor.load().await.unwrap();

        let (first, second, third) = tokio::join!(
            editor.add(draft("a")),
            editor.add(draft("b")),
            editor.add(draft("c"))
        );

        let mut indices = vec![
            first.unwrap().order_index,
            second.unwrap().order_index,
            third.unwrap().order_index,
        ];
        indices.sort();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(api.layout(PAGE).len(), 3);

        editor.close().await;
    }

    #[tokio::test]
    async fn test_index_overflow_leaves_editor_running() {
        let api = Arc::new(FakeApi::with_rows(&[(1, PAGE, i32::MAX)]));
        let editor = PageEditor::open(api.clone(), PAGE, ReconcilerConfig::default());
        editor.load().await.unwrap();

        let err = editor.add(draft("late")).await.unwrap_err();
        assert_eq!(err, ReconcileError::IndexOverflow { page_id: PAGE });

        let reloaded = editor.load().await.unwrap();
        assert_eq!(reloaded.len(), 1);

        editor.close().await;
    }

    #[tokio::test]
    async fn test_snapshot_follows_reorder() {
        let api = Arc::new(FakeApi::with_rows(&[(1, PAGE, 0), (2, PAGE, 1)]));
        let editor = PageEditor::open(api.clone(), PAGE, ReconcilerConfig::default());
        editor.load().await.unwrap();

        editor.reorder(vec![cid(2), cid(1)]).await.unwrap();

        let ids: Vec<ComponentId> = editor.snapshot().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![cid(2), cid(1)]);
        assert_eq!(api.layout(PAGE), vec![(2, 0), (1, 1)]);

        editor.close().await;
    }

    #[tokio::test]
    async fn test_delete_and_update_route_through_editor() {
        let api = Arc::new(FakeApi::with_rows(&[(1, PAGE, 0), (2, PAGE, 1)]));
        let editor = PageEditor::open(api.clone(), PAGE, ReconcilerConfig::default());
        editor.load().await.unwrap();

        editor.delete(cid(1)).await.unwrap();
        let updated = editor
            .update(
                2,
                ComponentPatch {
                    component_name: Some("Footer CTA".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.component_name.as_deref(), Some("Footer CTA"));
        assert_eq!(editor.snapshot().len(), 1);
        assert_eq!(
            editor.delete(cid(1)).await.unwrap_err(),
            ReconcileError::NotFound(cid(1))
        );

        editor.close().await;
    }
}
