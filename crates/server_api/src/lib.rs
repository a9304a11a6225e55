use shared::{
    domain::{ItemId, ListDetail, ListId, ListSummary},
    error::{ApiError, ErrorCode},
    protocol::{CheckedStateUpdate, NewListResponse},
};
use storage::Storage;
use tracing::info;

pub const MAX_NAME_CHARS: usize = 200;
pub const MAX_FILENAME_BYTES: usize = 180;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn list_summaries(ctx: &ApiContext) -> Result<Vec<ListSummary>, ApiError> {
    ctx.storage.list_summaries().await.map_err(internal)
}

pub async fn create_list(ctx: &ApiContext, name: &str) -> Result<NewListResponse, ApiError> {
    let name = validate_text("list name", name)?;
    let id = ctx.storage.create_list(name).await.map_err(internal)?;
    info!(list_id = id.0, "todo list created");
    Ok(NewListResponse {
        id,
        name: name.to_string(),
    })
}

pub async fn get_list(ctx: &ApiContext, list_id: ListId) -> Result<ListDetail, ApiError> {
    ctx.storage
        .get_list(list_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| missing_list(list_id))
}

pub async fn delete_list(ctx: &ApiContext, list_id: ListId) -> Result<bool, ApiError> {
    let deleted = ctx.storage.delete_list(list_id).await.map_err(internal)?;
    info!(list_id = list_id.0, deleted, "todo list delete requested");
    Ok(deleted)
}

pub async fn create_item(
    ctx: &ApiContext,
    list_id: ListId,
    label: &str,
) -> Result<ListDetail, ApiError> {
    let label = validate_text("item label", label)?;
    ctx.storage
        .create_item(list_id, label)
        .await
        .map_err(internal)?
        .ok_or_else(|| missing_list(list_id))
}

pub async fn delete_item(
    ctx: &ApiContext,
    list_id: ListId,
    item_id: ItemId,
) -> Result<ListDetail, ApiError> {
    ctx.storage
        .delete_item(list_id, item_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| missing_list(list_id))
}

pub async fn set_checked_state(
    ctx: &ApiContext,
    list_id: ListId,
    update: CheckedStateUpdate,
) -> Result<ListDetail, ApiError> {
    ctx.storage
        .set_item_checked_state(list_id, update.item_id, update.checked_state)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ApiError::not_found(format!(
                "item {} not found in list {}",
                update.item_id.0, list_id.0
            ))
        })
}

/// Validates the client-supplied name of an uploaded file. Uploads are stored
/// flat under one directory, so anything that could escape it is rejected.
pub fn sanitize_upload_filename(raw: &str) -> Result<&str, ApiError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::validation("upload filename cannot be empty"));
    }
    if name.len() > MAX_FILENAME_BYTES {
        return Err(ApiError::validation("upload filename is too long"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(ApiError::validation(
            "upload filename must not contain path separators",
        ));
    }
    if name == "." || name == ".." {
        return Err(ApiError::validation("upload filename is reserved"));
    }
    Ok(name)
}

fn validate_text<'a>(what: &str, raw: &'a str) -> Result<&'a str, ApiError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ApiError::validation(format!("{what} cannot be empty")));
    }
    if value.chars().count() > MAX_NAME_CHARS {
        return Err(ApiError::validation(format!(
            "{what} exceeds {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(value)
}

fn missing_list(list_id: ListId) -> ApiError {
    ApiError::new(ErrorCode::NotFound, format!("list {} not found", list_id.0))
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
