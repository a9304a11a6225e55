//! Request/response bodies and paths of the todo HTTP API.

use serde::{Deserialize, Serialize};

use crate::domain::{ItemId, ListId};

pub const LISTS_PATH: &str = "/api/lists";
pub const UPLOAD_PATH: &str = "/upload";
pub const UPLOAD_FIELD: &str = "file";

pub fn list_path(list_id: ListId) -> String {
    format!("{LISTS_PATH}/{}", list_id.0)
}

/// Item creation goes to the collection path with a trailing slash.
pub fn items_path(list_id: ListId) -> String {
    format!("{LISTS_PATH}/{}/items/", list_id.0)
}

pub fn item_path(list_id: ListId, item_id: ItemId) -> String {
    format!("{LISTS_PATH}/{}/items/{}", list_id.0, item_id.0)
}

pub fn checked_state_path(list_id: ListId) -> String {
    format!("{LISTS_PATH}/{}/checked_state", list_id.0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewList {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewListResponse {
    pub id: ListId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub label: String,
}

/// Explicit target state for one item; the server never toggles on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckedStateUpdate {
    pub item_id: ItemId,
    pub checked_state: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub filename: String,
    pub size_bytes: u64,
}
