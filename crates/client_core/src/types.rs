use shared::domain::{ListDetail, ListId, ListSummary};

use crate::error::{ErrorKind, SyncError};

/// Lifecycle of data fetched from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState<T> {
    Loading,
    Loaded(T),
    /// The first fetch failed; nothing has been displayed yet.
    Failed(ErrorKind),
}

impl<T> LoadState<T> {
    pub fn loaded(&self) -> Option<&T> {
        match self {
            LoadState::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadState::Loaded(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }
}

/// Which screen is active. Replaces a shared "selected id" value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewState {
    #[default]
    Collection,
    Detail(ListId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Refresh,
    CreateList,
    DeleteList,
    LoadDetail,
    CreateItem,
    DeleteItem,
    SetChecked,
    Upload,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Refresh => "refresh",
            Operation::CreateList => "create_list",
            Operation::DeleteList => "delete_list",
            Operation::LoadDetail => "load_detail",
            Operation::CreateItem => "create_item",
            Operation::DeleteItem => "delete_item",
            Operation::SetChecked => "set_checked",
            Operation::Upload => "upload",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    CollectionUpdated(Vec<ListSummary>),
    DetailUpdated(ListDetail),
    ViewChanged(ViewState),
    Error {
        operation: Operation,
        error: SyncError,
    },
}
