//! Items of the one selected list.

use std::{future::Future, sync::Arc};

use shared::domain::{ItemId, ListDetail, ListId};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::{
    error::{EntityKey, SyncError},
    inflight::InflightSet,
    remote::RemoteStore,
    types::{ClientEvent, LoadState, Operation},
};

/// Owns the full detail of one list for as long as it is selected.
///
/// Every item mutation is a single round trip whose response is the complete
/// updated list; that response replaces local state as-is.
pub struct DetailController {
    list_id: ListId,
    remote: Arc<dyn RemoteStore>,
    inflight: InflightSet,
    events: broadcast::Sender<ClientEvent>,
    inner: Mutex<DetailState>,
}

struct DetailState {
    detail: LoadState<ListDetail>,
    issued_generation: u64,
    applied_generation: u64,
}

impl DetailController {
    pub fn new(
        list_id: ListId,
        remote: Arc<dyn RemoteStore>,
        inflight: InflightSet,
        events: broadcast::Sender<ClientEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            list_id,
            remote,
            inflight,
            events,
            inner: Mutex::new(DetailState {
                detail: LoadState::Loading,
                issued_generation: 0,
                applied_generation: 0,
            }),
        })
    }

    pub fn list_id(&self) -> ListId {
        self.list_id
    }

    pub async fn state(&self) -> LoadState<ListDetail> {
        self.inner.lock().await.detail.clone()
    }

    pub async fn detail(&self) -> Option<ListDetail> {
        self.inner.lock().await.detail.loaded().cloned()
    }

    pub async fn load(&self) -> Result<ListDetail, SyncError> {
        let generation = self.next_generation().await;
        let result = match self.remote.get_list(self.list_id).await {
            Ok(detail) => self.apply(generation, detail).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            warn!(list_id = self.list_id.0, error = %err, "list detail load failed");
            {
                let mut guard = self.inner.lock().await;
                if !guard.detail.is_loaded() {
                    guard.detail = LoadState::Failed(err.kind());
                }
            }
            self.report(Operation::LoadDetail, err);
        }
        result
    }

    /// A second submit of the same label while the first is pending is
    /// rejected as busy.
    pub async fn create_item(&self, label: &str) -> Result<ListDetail, SyncError> {
        self.ensure_loaded().await?;
        let _token = self
            .inflight
            .try_acquire(EntityKey::NewItem(self.list_id, label.to_string()))?;
        self.round_trip(
            Operation::CreateItem,
            self.remote.create_item(self.list_id, label),
        )
        .await
    }

    pub async fn delete_item(&self, item_id: ItemId) -> Result<ListDetail, SyncError> {
        self.ensure_loaded().await?;
        let _token = self
            .inflight
            .acquire(EntityKey::Item(self.list_id, item_id))
            .await;
        self.round_trip(
            Operation::DeleteItem,
            self.remote.delete_item(self.list_id, item_id),
        )
        .await
    }

    /// Sends `checked` as the item's new state. Mutations of the same item
    /// are serialized, so back-to-back calls reach the server in call order.
    pub async fn toggle_checked(
        &self,
        item_id: ItemId,
        checked: bool,
    ) -> Result<ListDetail, SyncError> {
        self.ensure_loaded().await?;
        let _token = self
            .inflight
            .acquire(EntityKey::Item(self.list_id, item_id))
            .await;
        self.round_trip(
            Operation::SetChecked,
            self.remote.set_checked_state(self.list_id, item_id, checked),
        )
        .await
    }

    /// Flips the item's displayed state: the target is the negation of what
    /// is on screen at call time.
    pub async fn toggle_item(&self, item_id: ItemId) -> Result<ListDetail, SyncError> {
        let checked = {
            let guard = self.inner.lock().await;
            let detail = guard.detail.loaded().ok_or(SyncError::NotLoaded)?;
            detail
                .item(item_id)
                .ok_or(SyncError::UnknownItem(item_id))?
                .checked
        };
        self.toggle_checked(item_id, !checked).await
    }

    async fn ensure_loaded(&self) -> Result<(), SyncError> {
        if self.inner.lock().await.detail.is_loaded() {
            Ok(())
        } else {
            Err(SyncError::NotLoaded)
        }
    }

    async fn next_generation(&self) -> u64 {
        let mut guard = self.inner.lock().await;
        guard.issued_generation += 1;
        guard.issued_generation
    }

    async fn round_trip(
        &self,
        operation: Operation,
        request: impl Future<Output = Result<ListDetail, SyncError>>,
    ) -> Result<ListDetail, SyncError> {
        let generation = self.next_generation().await;
        let result = match request.await {
            Ok(detail) => self.apply(generation, detail).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            warn!(
                list_id = self.list_id.0,
                operation = operation.as_str(),
                error = %err,
                "item mutation failed"
            );
            self.report(operation, err);
        }
        result
    }

    async fn apply(&self, generation: u64, detail: ListDetail) -> Result<ListDetail, SyncError> {
        if detail.id != self.list_id {
            return Err(SyncError::Decode(format!(
                "server returned list {} while list {} is displayed",
                detail.id, self.list_id
            )));
        }

        let applied = {
            let mut guard = self.inner.lock().await;
            if generation > guard.applied_generation {
                guard.applied_generation = generation;
                guard.detail = LoadState::Loaded(detail.clone());
                true
            } else {
                debug!(
                    list_id = self.list_id.0,
                    generation,
                    applied = guard.applied_generation,
                    "discarding superseded list detail"
                );
                false
            }
        };
        if applied {
            let _ = self.events.send(ClientEvent::DetailUpdated(detail.clone()));
        }
        Ok(detail)
    }

    fn report(&self, operation: Operation, err: &SyncError) {
        let _ = self.events.send(ClientEvent::Error {
            operation,
            error: err.clone(),
        });
    }
}
