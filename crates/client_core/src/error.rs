//! Tagged failures returned from every controller operation.

use std::fmt;

use shared::domain::{ItemId, ListId};
use thiserror::Error;

/// An entity that can have at most one mutation in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    List(ListId),
    Item(ListId, ItemId),
    /// A list creation, keyed by the requested name so a double submit of the
    /// same name is caught.
    NewList(String),
    NewItem(ListId, String),
    Upload,
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::List(list_id) => write!(f, "list {list_id}"),
            EntityKey::Item(list_id, item_id) => write!(f, "item {item_id} of list {list_id}"),
            EntityKey::NewList(name) => write!(f, "new list {name:?}"),
            EntityKey::NewItem(list_id, label) => write!(f, "new item {label:?} in list {list_id}"),
            EntityKey::Upload => write!(f, "upload"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed server response: {0}")]
    Decode(String),
    #[error("{0} already has a request in flight")]
    Busy(EntityKey),
    #[error("no data loaded yet")]
    NotLoaded,
    #[error("item {0} is not in the displayed list")]
    UnknownItem(ItemId),
}

/// Copyable classification of a [`SyncError`], kept in `Failed` load states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    NotFound,
    Status(u16),
    Decode,
    Busy,
    NotLoaded,
    UnknownItem,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Transport(_) => ErrorKind::Transport,
            SyncError::Status { status: 404, .. } => ErrorKind::NotFound,
            SyncError::Status { status, .. } => ErrorKind::Status(*status),
            SyncError::Decode(_) => ErrorKind::Decode,
            SyncError::Busy(_) => ErrorKind::Busy,
            SyncError::NotLoaded => ErrorKind::NotLoaded,
            SyncError::UnknownItem(_) => ErrorKind::UnknownItem,
        }
    }

    /// Failures a user can reasonably retry by repeating the action.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport(_) | SyncError::Busy(_) => true,
            SyncError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}
