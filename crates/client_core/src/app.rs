//! Coordinator tying the view state to the controllers that back it.

use std::{collections::HashMap, sync::Arc};

use shared::domain::ListId;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{
    collection::CollectionController,
    config::ClientSettings,
    detail::DetailController,
    error::SyncError,
    inflight::InflightSet,
    remote::{HttpRemoteStore, RemoteStore},
    types::{ClientEvent, ViewState},
    upload::{UploadPhase, UploadTracker},
};

const EVENT_CAPACITY: usize = 1024;

/// Owns which screen is showing and the controller for each screen.
///
/// At most one [`DetailController`] exists, and only while the view is
/// [`ViewState::Detail`].
pub struct TodoApp {
    view: ViewState,
    remote: Arc<dyn RemoteStore>,
    inflight: InflightSet,
    events: broadcast::Sender<ClientEvent>,
    collection: Arc<CollectionController>,
    detail: Option<Arc<DetailController>>,
    uploads: HashMap<ListId, Arc<UploadTracker>>,
}

impl TodoApp {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inflight = InflightSet::new();
        let collection = CollectionController::new(remote.clone(), inflight.clone(), events.clone());
        Self {
            view: ViewState::Collection,
            remote,
            inflight,
            events,
            collection,
            detail: None,
            uploads: HashMap::new(),
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> anyhow::Result<Self> {
        let remote = HttpRemoteStore::from_settings(settings)?;
        info!(server_url = remote.server_url(), "todo client configured");
        Ok(Self::new(Arc::new(remote)))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn collection(&self) -> Arc<CollectionController> {
        self.collection.clone()
    }

    pub fn detail(&self) -> Option<Arc<DetailController>> {
        self.detail.clone()
    }

    /// Switches to the detail screen of `list_id` with a fresh, unloaded
    /// controller. No request is made; call [`DetailController::load`].
    pub fn select(&mut self, list_id: ListId) -> Arc<DetailController> {
        let detail = DetailController::new(
            list_id,
            self.remote.clone(),
            self.inflight.clone(),
            self.events.clone(),
        );
        self.detail = Some(detail.clone());
        self.set_view(ViewState::Detail(list_id));
        detail
    }

    /// Returns to the collection screen and refreshes it.
    pub async fn clear_selection(&mut self) -> Result<(), SyncError> {
        self.detail = None;
        self.set_view(ViewState::Collection);
        self.collection.refresh().await?;
        self.prune_upload_trackers().await;
        Ok(())
    }

    /// Drops trackers of lists missing from the loaded collection. A tracker
    /// with an upload still running is kept until a later prune.
    pub async fn prune_upload_trackers(&mut self) {
        let Some(summaries) = self.collection.summaries().await else {
            return;
        };
        let before = self.uploads.len();
        self.uploads.retain(|list_id, tracker| {
            summaries.iter().any(|summary| summary.id == *list_id)
                || tracker.state().phase == UploadPhase::Uploading
        });
        let pruned = before - self.uploads.len();
        if pruned > 0 {
            debug!(pruned, "dropped upload trackers of deleted lists");
        }
    }

    pub fn upload_tracker(&mut self, list_id: ListId) -> Arc<UploadTracker> {
        self.uploads
            .entry(list_id)
            .or_insert_with(|| UploadTracker::new(self.remote.clone(), self.events.clone()))
            .clone()
    }

    fn set_view(&mut self, view: ViewState) {
        self.view = view;
        let _ = self.events.send(ClientEvent::ViewChanged(view));
    }
}
