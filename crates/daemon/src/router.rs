//! HTTP routes of the file manager.
//!
//! Every route is an [`Endpoint`] variant. [`build_router`] registers
//! [`Endpoint::ALL`] and dispatches each one to its handler with an
//! exhaustive match, so a new endpoint cannot be added without a handler.
//!
//! Handlers run the synchronous [`FileExecutor`] calls on the blocking pool.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Query, State};
use axum::http::Method;
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use bytes::Bytes;
use protocol::messages::{
    BulkDeleteRequest, BulkDeleteResponse, DeleteRequest, ListQuery, ListResponse, RenameRequest,
    RouteInfo, ServiceInfo, UploadQuery, UploadResponse, UploadedFile,
};
use protocol::OperationStatus;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::files::{FileError, FileExecutor};
use crate::response::OperationResponse;

/// Name reported by the home route.
pub const SERVICE_NAME: &str = "filemgr";

/// Buffered multipart chunks between the request and the disk writer.
const UPLOAD_CHANNEL_DEPTH: usize = 16;

/// Shared state of every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Executor bound to the configured root.
    pub executor: Arc<FileExecutor>,
    /// Normalized route prefix, e.g. `/filemanager`.
    pub route_prefix: String,
}

impl AppState {
    pub fn new(executor: FileExecutor, route_prefix: impl Into<String>) -> Self {
        Self {
            executor: Arc::new(executor),
            route_prefix: route_prefix.into(),
        }
    }
}

/// Routes served by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Home,
    List,
    Rename,
    Delete,
    Upload,
    BulkDelete,
}

impl Endpoint {
    /// Every endpoint, in registration order.
    pub const ALL: [Endpoint; 6] = [
        Endpoint::Home,
        Endpoint::List,
        Endpoint::Rename,
        Endpoint::Delete,
        Endpoint::Upload,
        Endpoint::BulkDelete,
    ];

    pub fn method(&self) -> Method {
        match self {
            Endpoint::Home | Endpoint::List => Method::GET,
            Endpoint::Rename | Endpoint::Delete | Endpoint::Upload | Endpoint::BulkDelete => {
                Method::POST
            }
        }
    }

    /// Absolute path under a normalized prefix.
    pub fn path(&self, prefix: &str) -> String {
        match self {
            Endpoint::Home => "/".to_string(),
            Endpoint::List => format!("{}/", prefix),
            Endpoint::Rename => format!("{}/renameFile", prefix),
            Endpoint::Delete => format!("{}/deleteFile", prefix),
            Endpoint::Upload => format!("{}/uploadFiles", prefix),
            Endpoint::BulkDelete => format!("{}/bulkDelete", prefix),
        }
    }

    fn handler(&self) -> MethodRouter<AppState> {
        match self {
            Endpoint::Home => get(home),
            Endpoint::List => get(list_files),
            Endpoint::Rename => post(rename_file),
            Endpoint::Delete => post(delete_file),
            Endpoint::Upload => post(upload_files),
            Endpoint::BulkDelete => post(bulk_delete),
        }
    }
}

/// The route table for a prefix.
pub fn route_table(prefix: &str) -> Vec<RouteInfo> {
    Endpoint::ALL
        .iter()
        .map(|endpoint| RouteInfo {
            method: endpoint.method().to_string(),
            path: endpoint.path(prefix),
        })
        .collect()
}

/// Build the router for every [`Endpoint`].
///
/// The prefix without a trailing slash also serves the listing.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new();
    for endpoint in Endpoint::ALL {
        router = router.route(&endpoint.path(&state.route_prefix), endpoint.handler());
    }

    router
        .route(&state.route_prefix, Endpoint::List.handler())
        .with_state(state)
}

async fn blocking<T, F>(task: F) -> Result<T, FileError>
where
    F: FnOnce() -> Result<T, FileError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| FileError::Storage {
            path: PathBuf::new(),
            source: std::io::Error::other(e),
        })?
}

async fn home(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        routes: route_table(&state.route_prefix),
    })
}

async fn list_files(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ListResponse>, FileError> {
    let Query(query) = query?;
    let executor = Arc::clone(&state.executor);

    let listing =
        blocking(move || executor.list(query.path.as_deref(), query.include_hidden)).await?;
    Ok(Json(listing))
}

async fn rename_file(
    State(state): State<AppState>,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> Result<OperationResponse, FileError> {
    let Json(request) = payload?;
    let executor = Arc::clone(&state.executor);

    let result = blocking(move || {
        executor.rename(&request.old_path, &request.new_path, request.overwrite)
    })
    .await?;
    Ok(OperationResponse(result))
}

async fn delete_file(
    State(state): State<AppState>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<OperationResponse, FileError> {
    let Json(request) = payload?;
    let executor = Arc::clone(&state.executor);

    let result = blocking(move || executor.delete(&request.path)).await?;
    Ok(OperationResponse(result))
}

async fn bulk_delete(
    State(state): State<AppState>,
    payload: Result<Json<BulkDeleteRequest>, JsonRejection>,
) -> Result<Json<BulkDeleteResponse>, FileError> {
    let Json(request) = payload?;
    let executor = Arc::clone(&state.executor);

    let report = blocking(move || executor.bulk_delete(&request.paths)).await?;
    Ok(Json(report))
}

/// Messages from the request to the disk writer.
enum UploadEvent {
    File(String),
    Chunk(Bytes),
    Finish,
}

async fn upload_files(
    State(state): State<AppState>,
    query: Result<Query<UploadQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, FileError> {
    let Query(query) = query?;
    let mut multipart = multipart?;

    let executor = Arc::clone(&state.executor);
    let (tx, rx) = mpsc::channel(UPLOAD_CHANNEL_DEPTH);
    let writer = tokio::task::spawn_blocking(move || {
        write_upload(&executor, query.path.as_deref(), query.overwrite, rx)
    });

    match forward_multipart(&mut multipart, &tx).await {
        Ok(()) => {
            // A closed channel means the writer already failed; its error wins.
            let _ = tx.send(UploadEvent::Finish).await;
        }
        Err(err) => {
            drop(tx);
            // Wait for the writer so staged files are gone before answering.
            let _ = writer.await;
            return Err(err);
        }
    }
    drop(tx);

    let files = writer.await.map_err(|e| FileError::Storage {
        path: PathBuf::new(),
        source: std::io::Error::other(e),
    })??;

    Ok(Json(UploadResponse {
        status: OperationStatus::Success,
        files,
    }))
}

/// Send every file part of the form to the writer.
///
/// Parts without a file name are ignored, including the empty `filename=""`
/// parts browsers send for file inputs left blank. Stops quietly when the
/// writer has hung up.
async fn forward_multipart(
    multipart: &mut Multipart,
    tx: &mpsc::Sender<UploadEvent>,
) -> Result<(), FileError> {
    while let Some(mut field) = multipart.next_field().await? {
        let Some(file_name) = field
            .file_name()
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
        else {
            debug!(field = ?field.name(), "Ignoring form field without a file name");
            continue;
        };

        if tx.send(UploadEvent::File(file_name)).await.is_err() {
            return Ok(());
        }
        while let Some(chunk) = field.chunk().await? {
            if tx.send(UploadEvent::Chunk(chunk)).await.is_err() {
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Stage everything received and publish on [`UploadEvent::Finish`].
///
/// If the sender goes away first the batch is dropped, removing every
/// staged file.
fn write_upload(
    executor: &FileExecutor,
    directory: Option<&str>,
    overwrite: bool,
    mut rx: mpsc::Receiver<UploadEvent>,
) -> Result<Vec<UploadedFile>, FileError> {
    let mut batch = executor.begin_upload(directory, overwrite)?;

    while let Some(event) = rx.blocking_recv() {
        match event {
            UploadEvent::File(name) => {
                batch.add_file(&name)?;
            }
            UploadEvent::Chunk(data) => batch.append(&data)?,
            UploadEvent::Finish => return batch.commit(),
        }
    }

    warn!(staged = batch.len(), "Upload aborted before completion");
    Err(FileError::InvalidInput("upload aborted".to_string()))
}
