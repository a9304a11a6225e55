//! Summary collection of all todo lists.

use std::sync::Arc;

use shared::domain::{ListId, ListSummary};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::{EntityKey, SyncError},
    inflight::InflightSet,
    remote::RemoteStore,
    types::{ClientEvent, LoadState, Operation},
};

pub struct CollectionController {
    remote: Arc<dyn RemoteStore>,
    inflight: InflightSet,
    events: broadcast::Sender<ClientEvent>,
    inner: Mutex<CollectionState>,
}

struct CollectionState {
    summaries: LoadState<Vec<ListSummary>>,
    issued_generation: u64,
    applied_generation: u64,
}

impl CollectionController {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        inflight: InflightSet,
        events: broadcast::Sender<ClientEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            remote,
            inflight,
            events,
            inner: Mutex::new(CollectionState {
                summaries: LoadState::Loading,
                issued_generation: 0,
                applied_generation: 0,
            }),
        })
    }

    pub async fn state(&self) -> LoadState<Vec<ListSummary>> {
        self.inner.lock().await.summaries.clone()
    }

    pub async fn summaries(&self) -> Option<Vec<ListSummary>> {
        self.inner.lock().await.summaries.loaded().cloned()
    }

    /// Fetches every summary and replaces local state wholesale.
    ///
    /// Responses are applied in issue order: a refresh that lands after a
    /// newer one has already been applied is dropped.
    pub async fn refresh(&self) -> Result<Vec<ListSummary>, SyncError> {
        let generation = {
            let mut guard = self.inner.lock().await;
            guard.issued_generation += 1;
            guard.issued_generation
        };
        debug!(generation, "refreshing list summaries");

        match self.remote.list_summaries().await {
            Ok(summaries) => {
                let applied = {
                    let mut guard = self.inner.lock().await;
                    if generation > guard.applied_generation {
                        guard.applied_generation = generation;
                        guard.summaries = LoadState::Loaded(summaries.clone());
                        true
                    } else {
                        debug!(
                            generation,
                            applied = guard.applied_generation,
                            "discarding stale list summaries"
                        );
                        false
                    }
                };
                if applied {
                    let _ = self
                        .events
                        .send(ClientEvent::CollectionUpdated(summaries.clone()));
                }
                Ok(summaries)
            }
            Err(err) => {
                warn!(generation, error = %err, "list summary refresh failed");
                {
                    let mut guard = self.inner.lock().await;
                    if !guard.summaries.is_loaded() {
                        guard.summaries = LoadState::Failed(err.kind());
                    }
                }
                self.report(Operation::Refresh, &err);
                Err(err)
            }
        }
    }

    /// Creates a list, then refreshes whether or not the create succeeded.
    /// A second submit of the same name while the first is pending is
    /// rejected as busy.
    pub async fn create_list(&self, name: &str) -> Result<Vec<ListSummary>, SyncError> {
        let _token = self
            .inflight
            .try_acquire(EntityKey::NewList(name.to_string()))?;

        let created = self.remote.create_list(name).await;
        match &created {
            Ok(()) => info!(name, "todo list created"),
            Err(err) => {
                warn!(name, error = %err, "todo list create failed");
                self.report(Operation::CreateList, err);
            }
        }

        let refreshed = self.refresh().await;
        created?;
        refreshed
    }

    /// Deletes a list, then refreshes. Deletes of the same list are
    /// serialized.
    pub async fn delete_list(&self, list_id: ListId) -> Result<Vec<ListSummary>, SyncError> {
        let _token = self.inflight.acquire(EntityKey::List(list_id)).await;

        let deleted = self.remote.delete_list(list_id).await;
        match &deleted {
            Ok(()) => info!(list_id = list_id.0, "todo list deleted"),
            Err(err) => {
                warn!(list_id = list_id.0, error = %err, "todo list delete failed");
                self.report(Operation::DeleteList, err);
            }
        }

        let refreshed = self.refresh().await;
        deleted?;
        refreshed
    }

    fn report(&self, operation: Operation, err: &SyncError) {
        let _ = self.events.send(ClientEvent::Error {
            operation,
            error: err.clone(),
        });
    }
}
