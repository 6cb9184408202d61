//! `/github/*`: uploads, deletes and listings against the content store.

use super::Success;
use super::utils::{
    HandlerBody, deserialize_body, json_response, parse_multipart, query_param,
};
use crate::errors::{GatewayError, Result};
use content_store::types::EntryKind;
use content_store::{
    BatchUploader, ConflictAwareWriter, FileStore, FileUpload, RemoteFile, RetryPolicy,
    WriteReceipt,
};
use hyper::body::Bytes;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything the `/github/*` routes need, built once at startup.
pub struct FilesBackend {
    store: Arc<dyn FileStore>,
    writer: ConflictAwareWriter,
    batch: BatchUploader,
    default_branch: String,
}

impl FilesBackend {
    pub fn new(store: Arc<dyn FileStore>, policy: RetryPolicy, default_branch: String) -> Self {
        let writer = ConflictAwareWriter::new(store.clone(), policy);
        FilesBackend {
            store,
            batch: BatchUploader::new(writer.clone()),
            writer,
            default_branch,
        }
    }

    fn branch<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .map(str::trim)
            .filter(|branch| !branch.is_empty())
            .unwrap_or(&self.default_branch)
    }
}

/// A stored file as reported to clients.
#[derive(Debug, Serialize)]
pub struct FileData {
    name: String,
    path: String,
    url: Option<String>,
    download_url: Option<String>,
    size: u64,
    sha: String,
}

impl From<&RemoteFile> for FileData {
    fn from(file: &RemoteFile) -> Self {
        FileData {
            name: file.name.clone(),
            path: file.path.clone(),
            url: file.content_url.clone(),
            download_url: file.download_url.clone(),
            size: file.size_bytes,
            sha: file.version_marker.clone(),
        }
    }
}

impl From<&WriteReceipt> for FileData {
    fn from(receipt: &WriteReceipt) -> Self {
        FileData::from(&receipt.file)
    }
}

#[derive(Debug, Serialize)]
struct ListEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: EntryKind,
    size: u64,
    url: Option<String>,
    download_url: Option<String>,
}

impl From<RemoteFile> for ListEntry {
    fn from(file: RemoteFile) -> Self {
        ListEntry {
            name: file.name,
            path: file.path,
            kind: file.kind,
            size: file.size_bytes,
            url: file.content_url,
            download_url: file.download_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonUpload {
    #[serde(default)]
    path: String,
    data: serde_json::Value,
    message: Option<String>,
    branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteRequest {
    #[serde(default)]
    path: String,
    message: Option<String>,
    branch: Option<String>,
}

fn require_path(path: Option<&str>) -> Result<&str> {
    path.map(str::trim)
        .filter(|path| !path.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("Path is required".to_string()))
}

pub async fn verify_access(files: &FilesBackend) -> Result<Response<HandlerBody>> {
    let report = files.store.verify_access().await;
    let status = if report.authenticated {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };
    json_response(status, &report)
}

/// Multipart `file`, `path`, `message?`, `branch?`.
pub async fn upload_file(
    files: &FilesBackend,
    request: &Request<Bytes>,
) -> Result<Response<HandlerBody>> {
    let mut form = parse_multipart(request.headers(), request.body().clone()).await?;
    let file = form
        .take_files(&["file"])
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::BadRequest("No file provided".to_string()))?;
    let path = require_path(form.field("path"))?;
    let branch = files.branch(form.field("branch"));

    tracing::info!(name = %file.name, path, branch, "Uploading file");
    let receipt = files
        .writer
        .upload(&file, path, form.field("message"), branch)
        .await?;

    json_response(
        StatusCode::OK,
        &Success::with_data("File uploaded successfully", FileData::from(&receipt)),
    )
}

/// Multipart `file`/`files` (repeated), `path`, `message?`, `branch?`. Every
/// file gets a unique name under `path`.
pub async fn upload_files(
    files: &FilesBackend,
    request: &Request<Bytes>,
) -> Result<Response<HandlerBody>> {
    let mut form = parse_multipart(request.headers(), request.body().clone()).await?;
    let uploads = form.take_files(&["file", "files"]);
    if uploads.is_empty() {
        return Err(GatewayError::BadRequest("No files provided".to_string()));
    }
    let path = require_path(form.field("path"))?;
    let branch = files.branch(form.field("branch"));

    tracing::info!(count = uploads.len(), path, branch, "Uploading files");
    let receipts = files
        .batch
        .upload_all(&uploads, path, form.field("message"), branch)
        .await?;

    let data: Vec<FileData> = receipts.iter().map(FileData::from).collect();
    json_response(
        StatusCode::OK,
        &Success::with_data(format!("{} files uploaded successfully", data.len()), data),
    )
}

/// JSON `{path, data, message?, branch?}`; `data` is stored pretty-printed.
/// A `path` ending in `/` gets a unique `data-<timestamp>.json` name.
pub async fn upload_json(
    files: &FilesBackend,
    request: &Request<Bytes>,
) -> Result<Response<HandlerBody>> {
    let upload: JsonUpload = deserialize_body(request.body())?;
    let path = require_path(Some(upload.path.as_str()))?;
    let name = match path.rsplit_once('/') {
        Some((_, "")) => "data.json",
        Some((_, name)) => name,
        None => path,
    };
    let content = serde_json::to_vec_pretty(&upload.data)?;
    let file = FileUpload::new(name, content).with_content_type("application/json");
    let branch = files.branch(upload.branch.as_deref());

    let receipt = files
        .writer
        .upload(&file, path, upload.message.as_deref(), branch)
        .await?;

    json_response(
        StatusCode::OK,
        &Success::with_data("JSON uploaded successfully", FileData::from(&receipt)),
    )
}

/// JSON `{path, message?, branch?}`.
pub async fn delete_file(
    files: &FilesBackend,
    request: &Request<Bytes>,
) -> Result<Response<HandlerBody>> {
    let delete: DeleteRequest = deserialize_body(request.body())?;
    let path = require_path(Some(delete.path.as_str()))?;
    let branch = files.branch(delete.branch.as_deref());
    let message = delete
        .message
        .clone()
        .unwrap_or_else(|| format!("Delete {path}"));

    files.store.remove(path, &message, branch).await?;
    tracing::info!(path, branch, "File deleted");

    json_response(
        StatusCode::OK,
        &Success::<()>::message("File deleted successfully"),
    )
}

/// `?path=` (root when absent) and `?branch=`.
pub async fn list_files(
    files: &FilesBackend,
    request: &Request<Bytes>,
) -> Result<Response<HandlerBody>> {
    let path = query_param(request.uri(), "path").unwrap_or_default();
    let requested_branch = query_param(request.uri(), "branch");
    let branch = files.branch(requested_branch.as_deref());

    let entries: Vec<ListEntry> = files
        .store
        .list(&path, branch)
        .await?
        .into_iter()
        .map(ListEntry::from)
        .collect();

    json_response(StatusCode::OK, &Success::data(entries))
}
