use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::Value;
use shared::{
    domain::{Item, ItemId, ListDetail, ListId, ListSummary},
    error::ApiError,
    protocol::{NewListResponse, UploadResponse},
};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};

use crate::{
    error::SyncError,
    remote::{ProgressFn, RemoteStore, TransferProgress, UploadFile},
};

pub fn list(id: i64, name: &str, items: &[(i64, &str, bool)]) -> ListDetail {
    ListDetail {
        id: ListId(id),
        name: name.to_string(),
        items: items
            .iter()
            .map(|(item_id, label, checked)| Item {
                id: ItemId(*item_id),
                label: label.to_string(),
                checked: *checked,
            })
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Default)]
struct MockData {
    lists: Vec<ListDetail>,
    next_id: i64,
    fail_uploads: bool,
    uploaded_bytes: Vec<usize>,
}

/// In-memory todo API that records every request it receives.
#[derive(Clone, Default)]
pub struct MockServer {
    data: Arc<Mutex<MockData>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn clear_requests(&self) {
        self.requests.lock().await.clear();
    }

    pub async fn fail_uploads(&self) {
        self.data.lock().await.fail_uploads = true;
    }

    pub async fn uploaded_bytes(&self) -> Vec<usize> {
        self.data.lock().await.uploaded_bytes.clone()
    }
}

pub async fn spawn_mock_server(lists: Vec<ListDetail>) -> (String, MockServer) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock server addr");

    let next_id = lists
        .iter()
        .flat_map(|list| std::iter::once(list.id.0).chain(list.items.iter().map(|item| item.id.0)))
        .max()
        .unwrap_or(0);
    let server = MockServer {
        data: Arc::new(Mutex::new(MockData {
            lists,
            next_id,
            ..MockData::default()
        })),
        requests: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new().fallback(handle).with_state(server.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), server)
}

async fn handle(
    State(server): State<MockServer>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let json_body: Option<Value> = serde_json::from_slice(&body).ok();
    server.requests.lock().await.push(RecordedRequest {
        method: method.as_str().to_string(),
        path: path.clone(),
        body: json_body.clone(),
    });

    let mut guard = server.data.lock().await;
    let data = &mut *guard;
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let text = |field: &str| {
        json_body
            .as_ref()
            .and_then(|value| value[field].as_str())
            .unwrap_or_default()
            .trim()
            .to_string()
    };

    match (method.as_str(), segments.as_slice()) {
        ("GET", ["api", "lists"]) => {
            let summaries: Vec<ListSummary> = data.lists.iter().map(ListDetail::summary).collect();
            Json(summaries).into_response()
        }
        ("POST", ["api", "lists"]) => {
            let name = text("name");
            if name.is_empty() {
                return failure(StatusCode::BAD_REQUEST, ApiError::validation("list name must not be empty"));
            }
            data.next_id += 1;
            let id = ListId(data.next_id);
            data.lists.push(ListDetail {
                id,
                name: name.clone(),
                items: Vec::new(),
            });
            (StatusCode::CREATED, Json(NewListResponse { id, name })).into_response()
        }
        ("GET", ["api", "lists", list_id]) => match find_list(&mut data.lists, list_id) {
            Some(list) => Json(list.clone()).into_response(),
            None => missing(),
        },
        ("DELETE", ["api", "lists", list_id]) => {
            let before = data.lists.len();
            data.lists.retain(|list| Some(list.id.0) != list_id.parse().ok());
            Json(data.lists.len() != before).into_response()
        }
        ("POST", ["api", "lists", list_id, "items", ""]) => {
            let label = text("label");
            data.next_id += 1;
            let item_id = ItemId(data.next_id);
            match find_list(&mut data.lists, list_id) {
                Some(list) => {
                    list.items.push(Item {
                        id: item_id,
                        label,
                        checked: false,
                    });
                    (StatusCode::CREATED, Json(list.clone())).into_response()
                }
                None => missing(),
            }
        }
        ("DELETE", ["api", "lists", list_id, "items", item_id]) => {
            match find_list(&mut data.lists, list_id) {
                Some(list) => {
                    list.items.retain(|item| Some(item.id.0) != item_id.parse().ok());
                    Json(list.clone()).into_response()
                }
                None => missing(),
            }
        }
        ("PATCH", ["api", "lists", list_id, "checked_state"]) => {
            let item_id = json_body.as_ref().and_then(|value| value["item_id"].as_i64());
            let checked = json_body
                .as_ref()
                .and_then(|value| value["checked_state"].as_bool())
                .unwrap_or_default();
            let Some(list) = find_list(&mut data.lists, list_id) else {
                return missing();
            };
            match list.items.iter_mut().find(|item| Some(item.id.0) == item_id) {
                Some(item) => {
                    item.checked = checked;
                    Json(list.clone()).into_response()
                }
                None => missing(),
            }
        }
        ("POST", ["upload"]) => {
            if data.fail_uploads {
                return failure(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new(shared::error::ErrorCode::Internal, "disk full"),
                );
            }
            data.uploaded_bytes.push(body.len());
            Json(UploadResponse {
                filename: "upload".to_string(),
                size_bytes: body.len() as u64,
            })
            .into_response()
        }
        _ => missing(),
    }
}

fn find_list<'a>(lists: &'a mut [ListDetail], list_id: &str) -> Option<&'a mut ListDetail> {
    let list_id: i64 = list_id.parse().ok()?;
    lists.iter_mut().find(|list| list.id.0 == list_id)
}

fn missing() -> Response {
    failure(StatusCode::NOT_FOUND, ApiError::not_found("no such list or item"))
}

fn failure(status: StatusCode, body: ApiError) -> Response {
    (status, Json(body)).into_response()
}

/// One canned response, optionally held back until the test releases it.
pub struct Scripted<T> {
    gate: Option<oneshot::Receiver<()>>,
    result: Result<T, SyncError>,
}

impl<T> Scripted<T> {
    pub fn ready(result: Result<T, SyncError>) -> Self {
        Self { gate: None, result }
    }

    pub fn gated(result: Result<T, SyncError>) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                gate: Some(rx),
                result,
            },
            tx,
        )
    }

    async fn resolve(self) -> Result<T, SyncError> {
        if let Some(gate) = self.gate {
            let _ = gate.await;
        }
        self.result
    }
}

pub struct ScriptedUpload {
    pub progress: Vec<TransferProgress>,
    pub response: Scripted<UploadResponse>,
}

/// [`RemoteStore`] that answers from per-kind queues of canned responses.
#[derive(Default)]
pub struct ScriptedRemote {
    calls: Mutex<Vec<String>>,
    summaries: Mutex<VecDeque<Scripted<Vec<ListSummary>>>>,
    acks: Mutex<VecDeque<Scripted<()>>>,
    details: Mutex<VecDeque<Scripted<ListDetail>>>,
    uploads: Mutex<VecDeque<ScriptedUpload>>,
}

impl ScriptedRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn push_summaries(&self, response: Scripted<Vec<ListSummary>>) {
        self.summaries.lock().await.push_back(response);
    }

    pub async fn push_ack(&self, response: Scripted<()>) {
        self.acks.lock().await.push_back(response);
    }

    pub async fn push_detail(&self, response: Scripted<ListDetail>) {
        self.details.lock().await.push_back(response);
    }

    pub async fn push_upload(&self, upload: ScriptedUpload) {
        self.uploads.lock().await.push_back(upload);
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    /// Yields until at least `count` calls have been recorded.
    pub async fn wait_for_calls(&self, count: usize) {
        while self.calls.lock().await.len() < count {
            tokio::task::yield_now().await;
        }
    }

    // Calls are recorded after the canned response is claimed, so a test
    // that saw the call knows which response it got.
    async fn record(&self, call: String) {
        self.calls.lock().await.push(call);
    }

    async fn next_detail(&self, call: String) -> Result<ListDetail, SyncError> {
        let next = self.details.lock().await.pop_front();
        self.record(call).await;
        match next {
            Some(scripted) => scripted.resolve().await,
            None => Err(SyncError::Transport("no scripted detail".into())),
        }
    }

    async fn next_ack(&self, call: String) -> Result<(), SyncError> {
        let next = self.acks.lock().await.pop_front();
        self.record(call).await;
        match next {
            Some(scripted) => scripted.resolve().await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for ScriptedRemote {
    async fn list_summaries(&self) -> Result<Vec<ListSummary>, SyncError> {
        let next = self.summaries.lock().await.pop_front();
        self.record("list_summaries".into()).await;
        match next {
            Some(scripted) => scripted.resolve().await,
            None => Err(SyncError::Transport("no scripted summaries".into())),
        }
    }

    async fn create_list(&self, name: &str) -> Result<(), SyncError> {
        self.next_ack(format!("create_list {name}")).await
    }

    async fn delete_list(&self, list_id: ListId) -> Result<(), SyncError> {
        self.next_ack(format!("delete_list {list_id}")).await
    }

    async fn get_list(&self, list_id: ListId) -> Result<ListDetail, SyncError> {
        self.next_detail(format!("get_list {list_id}")).await
    }

    async fn create_item(&self, list_id: ListId, label: &str) -> Result<ListDetail, SyncError> {
        self.next_detail(format!("create_item {list_id} {label}")).await
    }

    async fn delete_item(
        &self,
        list_id: ListId,
        item_id: ItemId,
    ) -> Result<ListDetail, SyncError> {
        self.next_detail(format!("delete_item {list_id} {item_id}")).await
    }

    async fn set_checked_state(
        &self,
        list_id: ListId,
        item_id: ItemId,
        checked_state: bool,
    ) -> Result<ListDetail, SyncError> {
        self.next_detail(format!("set_checked_state {list_id} {item_id} {checked_state}")).await
    }

    async fn upload_file(
        &self,
        file: UploadFile,
        progress: ProgressFn,
    ) -> Result<UploadResponse, SyncError> {
        let next = self.uploads.lock().await.pop_front();
        self.record(format!("upload_file {} {}", file.filename, file.len()))
            .await;
        let Some(upload) = next else {
            return Err(SyncError::Transport("no scripted upload".into()));
        };
        for update in upload.progress {
            (*progress)(update);
        }
        upload.response.resolve().await
    }
}
