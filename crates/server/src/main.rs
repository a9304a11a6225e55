use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use axum::{
    extract::{
        multipart::{Field, MultipartError},
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use server_api::{sanitize_upload_filename, ApiContext};
use shared::{
    domain::{ItemId, ListDetail, ListId, ListSummary},
    error::{ApiError, ErrorCode},
    protocol::{
        CheckedStateUpdate, NewItem, NewList, NewListResponse, UploadResponse, UPLOAD_FIELD,
    },
};
use storage::Storage;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

struct AppState {
    api: ApiContext,
    upload_dir: PathBuf,
    max_upload_bytes: usize,
}

type ApiFailure = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    let default_level = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    storage.health_check().await?;

    let state = AppState {
        api: ApiContext { storage },
        upload_dir: settings.upload_dir,
        max_upload_bytes: settings.max_upload_bytes,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "todo server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let max_upload_bytes = state.max_upload_bytes;
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/lists", get(http_list_summaries).post(http_create_list))
        .route("/api/lists/:list_id", get(http_get_list).delete(http_delete_list))
        .route("/api/lists/:list_id/items/", post(http_create_item))
        .route(
            "/api/lists/:list_id/items/:item_id",
            delete(http_delete_item),
        )
        .route(
            "/api/lists/:list_id/checked_state",
            patch(http_set_checked_state),
        )
        .route("/upload", post(upload_file))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, ApiFailure> {
    state.api.storage.health_check().await.map_err(|e| {
        failure(ApiError::new(ErrorCode::Internal, e.to_string()))
    })?;
    Ok("ok")
}

async fn http_list_summaries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ListSummary>>, ApiFailure> {
    server_api::list_summaries(&state.api)
        .await
        .map(Json)
        .map_err(failure)
}

async fn http_create_list(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewList>,
) -> Result<(StatusCode, Json<NewListResponse>), ApiFailure> {
    let created = server_api::create_list(&state.api, &req.name)
        .await
        .map_err(failure)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn http_get_list(
    State(state): State<Arc<AppState>>,
    Path(list_id): Path<i64>,
) -> Result<Json<ListDetail>, ApiFailure> {
    server_api::get_list(&state.api, ListId(list_id))
        .await
        .map(Json)
        .map_err(failure)
}

async fn http_delete_list(
    State(state): State<Arc<AppState>>,
    Path(list_id): Path<i64>,
) -> Result<Json<bool>, ApiFailure> {
    server_api::delete_list(&state.api, ListId(list_id))
        .await
        .map(Json)
        .map_err(failure)
}

async fn http_create_item(
    State(state): State<Arc<AppState>>,
    Path(list_id): Path<i64>,
    Json(req): Json<NewItem>,
) -> Result<(StatusCode, Json<ListDetail>), ApiFailure> {
    let detail = server_api::create_item(&state.api, ListId(list_id), &req.label)
        .await
        .map_err(failure)?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn http_delete_item(
    State(state): State<Arc<AppState>>,
    Path((list_id, item_id)): Path<(i64, i64)>,
) -> Result<Json<ListDetail>, ApiFailure> {
    server_api::delete_item(&state.api, ListId(list_id), ItemId(item_id))
        .await
        .map(Json)
        .map_err(failure)
}

async fn http_set_checked_state(
    State(state): State<Arc<AppState>>,
    Path(list_id): Path<i64>,
    Json(update): Json<CheckedStateUpdate>,
) -> Result<Json<ListDetail>, ApiFailure> {
    server_api::set_checked_state(&state.api, ListId(list_id), update)
        .await
        .map(Json)
        .map_err(failure)
}

/// Spools the `file` field to a temporary file, then appends it to the stored
/// file of the same name. A request that fails partway leaves the stored file
/// untouched.
async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiFailure> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_failure)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = sanitize_upload_filename(field.file_name().unwrap_or_default())
            .map_err(failure)?
            .to_string();

        tokio::fs::create_dir_all(&state.upload_dir)
            .await
            .map_err(io_failure)?;
        let spool = spool_path(&state.upload_dir, &filename);

        let stored = match spool_field(field, &spool, state.max_upload_bytes).await {
            Ok(size_bytes) => append_spool(&spool, &state.upload_dir.join(&filename))
                .await
                .map(|()| size_bytes),
            Err(err) => Err(err),
        };
        if let Err(err) = tokio::fs::remove_file(&spool).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %spool.display(), %err, "failed to remove upload spool file");
            }
        }
        let size_bytes = stored?;

        info!(%filename, size_bytes, "upload stored");
        return Ok(Json(UploadResponse {
            filename,
            size_bytes,
        }));
    }

    Err(failure(ApiError::validation(format!(
        "missing multipart field '{UPLOAD_FIELD}'"
    ))))
}

fn spool_path(upload_dir: &std::path::Path, filename: &str) -> PathBuf {
    static NEXT_SPOOL: AtomicU64 = AtomicU64::new(0);
    let seq = NEXT_SPOOL.fetch_add(1, Ordering::Relaxed);
    upload_dir.join(format!(".{filename}.{seq}.part"))
}

async fn spool_field(
    mut field: Field<'_>,
    spool: &std::path::Path,
    max_upload_bytes: usize,
) -> Result<u64, ApiFailure> {
    let mut out = tokio::fs::File::create(spool).await.map_err(io_failure)?;
    let mut size_bytes = 0u64;
    while let Some(chunk) = field.chunk().await.map_err(multipart_failure)? {
        size_bytes += chunk.len() as u64;
        if size_bytes > max_upload_bytes as u64 {
            warn!(size_bytes, "upload exceeded size limit");
            return Err(failure(ApiError::new(
                ErrorCode::PayloadTooLarge,
                format!("upload exceeds {max_upload_bytes} bytes"),
            )));
        }
        out.write_all(&chunk).await.map_err(io_failure)?;
    }
    out.flush().await.map_err(io_failure)?;
    Ok(size_bytes)
}

async fn append_spool(spool: &std::path::Path, target: &std::path::Path) -> Result<(), ApiFailure> {
    let mut source = tokio::fs::File::open(spool).await.map_err(io_failure)?;
    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(target)
        .await
        .map_err(io_failure)?;
    tokio::io::copy(&mut source, &mut out)
        .await
        .map_err(io_failure)?;
    out.flush().await.map_err(io_failure)
}

fn failure(err: ApiError) -> ApiFailure {
    let status =
        StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err))
}

fn multipart_failure(err: MultipartError) -> ApiFailure {
    let status = err.status();
    let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
        ErrorCode::PayloadTooLarge
    } else if status.is_server_error() {
        ErrorCode::Internal
    } else {
        ErrorCode::Validation
    };
    (status, Json(ApiError::new(code, err.body_text())))
}

fn io_failure(err: std::io::Error) -> ApiFailure {
    error!(%err, "upload write failed");
    failure(ApiError::new(ErrorCode::Internal, err.to_string()))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
