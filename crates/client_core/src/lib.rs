//! Client-side synchronization core for the todo-list service.
//!
//! The [`TodoApp`] coordinator owns the view state and hands out the
//! controllers that talk to the server through a [`RemoteStore`].

pub mod app;
pub mod collection;
pub mod config;
pub mod detail;
pub mod error;
pub mod inflight;
pub mod remote;
pub mod types;
pub mod upload;

pub use app::TodoApp;
pub use collection::CollectionController;
pub use config::{load_client_settings, ClientSettings};
pub use detail::DetailController;
pub use error::{EntityKey, ErrorKind, SyncError};
pub use inflight::{InflightSet, InflightToken};
pub use remote::{HttpRemoteStore, ProgressFn, RemoteStore, TransferProgress, UploadFile};
pub use types::{ClientEvent, LoadState, Operation, ViewState};
pub use upload::{UploadPhase, UploadState, UploadTracker};

#[cfg(test)]
#[path = "tests/support.rs"]
mod support;

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod http_tests;

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod controller_tests;
