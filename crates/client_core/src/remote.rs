//! Client side of the todo HTTP API.

use std::{path::Path, sync::Arc};

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use reqwest::{multipart, Body, Client, Response};
use shared::{
    domain::{ItemId, ListDetail, ListId, ListSummary},
    error::ApiError,
    protocol::{
        checked_state_path, item_path, items_path, list_path, CheckedStateUpdate, NewItem,
        NewList, UploadResponse, LISTS_PATH, UPLOAD_FIELD, UPLOAD_PATH,
    },
};
use tracing::debug;
use url::Url;

use crate::{config::ClientSettings, error::SyncError};

/// Cumulative bytes handed to the transport for one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub sent: u64,
    pub total: Option<u64>,
}

pub type ProgressFn = Arc<dyn Fn(TransferProgress) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: None,
            bytes,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub async fn from_path(path: &Path) -> Result<Self, SyncError> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());
        Ok(Self::new(filename, bytes))
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The remote todo API. Every call is one request/response round trip.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_summaries(&self) -> Result<Vec<ListSummary>, SyncError>;
    async fn create_list(&self, name: &str) -> Result<(), SyncError>;
    async fn delete_list(&self, list_id: ListId) -> Result<(), SyncError>;
    async fn get_list(&self, list_id: ListId) -> Result<ListDetail, SyncError>;
    async fn create_item(&self, list_id: ListId, label: &str) -> Result<ListDetail, SyncError>;
    async fn delete_item(&self, list_id: ListId, item_id: ItemId)
        -> Result<ListDetail, SyncError>;
    async fn set_checked_state(
        &self,
        list_id: ListId,
        item_id: ItemId,
        checked_state: bool,
    ) -> Result<ListDetail, SyncError>;
    async fn upload_file(
        &self,
        file: UploadFile,
        progress: ProgressFn,
    ) -> Result<UploadResponse, SyncError>;
}

pub struct HttpRemoteStore {
    http: Client,
    server_url: String,
    upload_chunk_bytes: usize,
}

impl HttpRemoteStore {
    pub fn new(server_url: impl Into<String>) -> anyhow::Result<Self> {
        Self::from_settings(&ClientSettings {
            server_url: server_url.into(),
            ..ClientSettings::default()
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> anyhow::Result<Self> {
        let parsed = Url::parse(&settings.server_url)
            .with_context(|| format!("invalid server url '{}'", settings.server_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("unsupported server url scheme '{}'", parsed.scheme());
        }

        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            server_url: settings.server_url.trim_end_matches('/').to_string(),
            upload_chunk_bytes: settings.upload_chunk_bytes.max(1),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server_url)
    }
}

/// Turns a non-success status into [`SyncError::Status`], preferring the
/// server's `ApiError` message when the body carries one.
async fn expect_success(res: Response) -> Result<Response, SyncError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let fallback = status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();
    let message = match res.json::<ApiError>().await {
        Ok(body) => body.message,
        Err(_) => fallback,
    };
    Err(SyncError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn list_summaries(&self) -> Result<Vec<ListSummary>, SyncError> {
        let res = self.http.get(self.url(LISTS_PATH)).send().await?;
        Ok(expect_success(res).await?.json().await?)
    }

    async fn create_list(&self, name: &str) -> Result<(), SyncError> {
        let res = self
            .http
            .post(self.url(LISTS_PATH))
            .json(&NewList {
                name: name.to_string(),
            })
            .send()
            .await?;
        expect_success(res).await?;
        Ok(())
    }

    async fn delete_list(&self, list_id: ListId) -> Result<(), SyncError> {
        let res = self.http.delete(self.url(&list_path(list_id))).send().await?;
        expect_success(res).await?;
        Ok(())
    }

    async fn get_list(&self, list_id: ListId) -> Result<ListDetail, SyncError> {
        let res = self.http.get(self.url(&list_path(list_id))).send().await?;
        Ok(expect_success(res).await?.json().await?)
    }

    async fn create_item(&self, list_id: ListId, label: &str) -> Result<ListDetail, SyncError> {
        let res = self
            .http
            .post(self.url(&items_path(list_id)))
            .json(&NewItem {
                label: label.to_string(),
            })
            .send()
            .await?;
        Ok(expect_success(res).await?.json().await?)
    }

    async fn delete_item(
        &self,
        list_id: ListId,
        item_id: ItemId,
    ) -> Result<ListDetail, SyncError> {
        let res = self
            .http
            .delete(self.url(&item_path(list_id, item_id)))
            .send()
            .await?;
        Ok(expect_success(res).await?.json().await?)
    }

    async fn set_checked_state(
        &self,
        list_id: ListId,
        item_id: ItemId,
        checked_state: bool,
    ) -> Result<ListDetail, SyncError> {
        let res = self
            .http
            .patch(self.url(&checked_state_path(list_id)))
            .json(&CheckedStateUpdate {
                item_id,
                checked_state,
            })
            .send()
            .await?;
        Ok(expect_success(res).await?.json().await?)
    }

    async fn upload_file(
        &self,
        file: UploadFile,
        progress: ProgressFn,
    ) -> Result<UploadResponse, SyncError> {
        let total = file.len();
        let chunks: Vec<Vec<u8>> = file
            .bytes
            .chunks(self.upload_chunk_bytes)
            .map(<[u8]>::to_vec)
            .collect();

        // Progress is reported as each chunk is pulled by the transport.
        let mut sent = 0u64;
        let body = stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            (*progress)(TransferProgress {
                sent,
                total: Some(total),
            });
            Ok::<_, std::io::Error>(chunk)
        });

        let mut part = multipart::Part::stream_with_length(Body::wrap_stream(body), total)
            .file_name(file.filename.clone());
        if let Some(mime_type) = &file.mime_type {
            part = part.mime_str(mime_type)?;
        }
        let form = multipart::Form::new().part(UPLOAD_FIELD, part);

        let res = self
            .http
            .post(self.url(UPLOAD_PATH))
            .multipart(form)
            .send()
            .await?;
        let bytes = expect_success(res).await?.bytes().await?;

        // Only the status matters; servers that answer without a receipt body
        // still count as a successful upload.
        match serde_json::from_slice::<UploadResponse>(&bytes) {
            Ok(receipt) => Ok(receipt),
            Err(error) => {
                debug!(%error, "upload response carried no receipt");
                Ok(UploadResponse {
                    filename: file.filename,
                    size_bytes: total,
                })
            }
        }
    }
}
