//! Lifecycle of one file transfer for a list row.

use std::sync::Arc;

use shared::protocol::UploadResponse;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::{
    error::{EntityKey, SyncError},
    remote::{ProgressFn, RemoteStore, TransferProgress, UploadFile},
    types::{ClientEvent, Operation},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadPhase {
    #[default]
    Idle,
    Uploading,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadState {
    pub phase: UploadPhase,
    /// Percent sent; `None` while the total size is unknown.
    pub progress: Option<u8>,
}

pub struct UploadTracker {
    remote: Arc<dyn RemoteStore>,
    events: broadcast::Sender<ClientEvent>,
    state: Arc<watch::Sender<UploadState>>,
}

impl UploadTracker {
    pub fn new(remote: Arc<dyn RemoteStore>, events: broadcast::Sender<ClientEvent>) -> Arc<Self> {
        let (state, _) = watch::channel(UploadState::default());
        Arc::new(Self {
            remote,
            events,
            state: Arc::new(state),
        })
    }

    pub fn state(&self) -> UploadState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    /// Whether a new upload may start.
    pub fn select_file(&self) -> bool {
        self.state.borrow().phase != UploadPhase::Uploading
    }

    /// Sends `file` to the upload endpoint. Failures land in
    /// [`UploadPhase::Error`]; nothing is retried.
    pub async fn begin_upload(&self, file: UploadFile) -> Result<UploadResponse, SyncError> {
        let initial = progress_percent(0, Some(file.len()));
        let started = self.state.send_if_modified(|state| {
            if state.phase == UploadPhase::Uploading {
                return false;
            }
            *state = UploadState {
                phase: UploadPhase::Uploading,
                progress: initial,
            };
            true
        });
        if !started {
            return Err(SyncError::Busy(EntityKey::Upload));
        }

        let filename = file.filename.clone();
        let size = file.len();
        info!(filename = %filename, size, "upload started");

        let state = self.state.clone();
        let progress: ProgressFn = Arc::new(move |update: TransferProgress| {
            record_progress(&state, update);
        });

        let result = self.remote.upload_file(file, progress).await;
        match &result {
            Ok(receipt) => {
                info!(filename = %receipt.filename, size = receipt.size_bytes, "upload finished");
                self.state.send_modify(|state| {
                    state.phase = UploadPhase::Success;
                    if state.progress.is_some() {
                        state.progress = Some(100);
                    }
                });
            }
            Err(err) => {
                warn!(filename = %filename, error = %err, "upload failed");
                self.state.send_modify(|state| state.phase = UploadPhase::Error);
                let _ = self.events.send(ClientEvent::Error {
                    operation: Operation::Upload,
                    error: err.clone(),
                });
            }
        }
        result
    }
}

fn record_progress(state: &watch::Sender<UploadState>, update: TransferProgress) {
    let Some(percent) = progress_percent(update.sent, update.total) else {
        return;
    };
    state.send_if_modified(|current| {
        if current.phase != UploadPhase::Uploading {
            return false;
        }
        match current.progress {
            Some(previous) if previous >= percent => false,
            _ => {
                debug!(progress = percent, sent = update.sent, "upload progress");
                current.progress = Some(percent);
                true
            }
        }
    });
}

/// `round(sent * 100 / total)` clamped to 100, or `None` when the total is
/// unknown or zero.
pub fn progress_percent(sent: u64, total: Option<u64>) -> Option<u8> {
    let total = total.filter(|total| *total > 0)?;
    let sent = u128::from(sent.min(total));
    let total = u128::from(total);
    let percent = (sent * 100 + total / 2) / total;
    Some(percent.min(100) as u8)
}
