//! `/upload` and `/upload-multiple`: image uploads to the media CDN.

use super::utils::{HandlerBody, json_response, parse_multipart};
use crate::errors::{GatewayError, Result};
use crate::upstreams::media::MediaClient;
use hyper::body::Bytes;
use hyper::{Request, Response, StatusCode};

/// Multipart `file`; responds with the CDN's description of the asset.
pub async fn upload(media: &MediaClient, request: &Request<Bytes>) -> Result<Response<HandlerBody>> {
    let mut form = parse_multipart(request.headers(), request.body().clone()).await?;
    let file = form
        .take_files(&["file"])
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::BadRequest("No file provided".to_string()))?;

    let asset = media.upload(&file).await?;
    json_response(StatusCode::OK, &asset)
}

/// Every file part of the form, whatever its field name. Per-file failures
/// are reported in the summary, not as an error status.
pub async fn upload_multiple(
    media: &MediaClient,
    request: &Request<Bytes>,
) -> Result<Response<HandlerBody>> {
    let mut form = parse_multipart(request.headers(), request.body().clone()).await?;
    let files = form.take_all_files();
    if files.is_empty() {
        return Err(GatewayError::BadRequest("No files provided".to_string()));
    }

    let summary = media.upload_many(&files).await;
    tracing::info!(
        total = summary.total,
        uploaded = summary.total_uploaded,
        failed = summary.total_failed,
        "Media batch finished"
    );
    json_response(StatusCode::OK, &summary)
}
