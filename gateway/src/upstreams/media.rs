//! Signed image uploads to the media CDN.

use super::http_client;
use crate::config::MediaConfig;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use content_store::FileUpload;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::secret::Secret;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use url::Url;

pub const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Invalid file type. Only JPEG, PNG, GIF, and WebP are allowed")]
    UnsupportedType { content_type: Option<String> },

    #[error("media CDN returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid media CDN URL: {0}")]
    InvalidUrl(String),
}

/// The CDN's description of a stored asset. Fields not modelled here are
/// kept in `extra` and passed through unchanged.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct UploadedAsset {
    pub public_id: String,
    pub secure_url: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_name: String,
    pub url: String,
    pub public_id: String,
    pub format: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedFile {
    pub file_name: String,
    pub error: String,
}

/// Outcome of a multi-file upload. One file failing does not stop the rest.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub successful: Vec<UploadedFile>,
    pub failed: Vec<FailedFile>,
    pub total_uploaded: usize,
    pub total_failed: usize,
    pub total: usize,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct MediaClient {
    client: reqwest::Client,
    upload_url: Url,
    api_key: Secret,
    api_secret: Secret,
    folder: String,
}

impl MediaClient {
    pub fn new(config: &MediaConfig) -> Result<Self, MediaError> {
        let mut upload_url = config.api_url.clone();
        upload_url
            .path_segments_mut()
            .map_err(|_| MediaError::InvalidUrl(config.api_url.to_string()))?
            .pop_if_empty()
            .extend(["v1_1", config.cloud_name.as_str(), "auto", "upload"]);

        Ok(MediaClient {
            client: http_client(config.http_timeout_secs)?,
            upload_url,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            folder: config.folder.clone(),
        })
    }

    pub async fn upload(&self, file: &FileUpload) -> Result<UploadedAsset, MediaError> {
        let content_type = allowed_content_type(file)?;
        let timestamp = unix_timestamp().to_string();
        let signature = sign(
            &[("folder", self.folder.as_str()), ("timestamp", timestamp.as_str())],
            &self.api_secret,
        );
        let data_uri = format!(
            "data:{content_type};base64,{}",
            BASE64.encode(&file.content)
        );

        let form = [
            ("file", data_uri.as_str()),
            ("api_key", self.api_key.expose()),
            ("folder", self.folder.as_str()),
            ("timestamp", timestamp.as_str()),
            ("signature", signature.as_str()),
            ("signature_algorithm", "sha256"),
        ];

        let response = self
            .client
            .post(self.upload_url.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            tracing::warn!(name = %file.name, status = status.as_u16(), %message, "Media upload rejected");
            return Err(MediaError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let asset: UploadedAsset = response.json().await?;
        tracing::info!(name = %file.name, public_id = %asset.public_id, "Media asset uploaded");
        Ok(asset)
    }

    /// Uploads each file in turn, collecting per-file outcomes.
    pub async fn upload_many(&self, files: &[FileUpload]) -> UploadSummary {
        let mut successful = Vec::new();
        let mut failed = Vec::new();

        for file in files {
            match self.upload(file).await {
                Ok(asset) => successful.push(UploadedFile {
                    file_name: file.name.clone(),
                    url: asset.secure_url,
                    public_id: asset.public_id,
                    format: asset.format,
                    width: asset.width,
                    height: asset.height,
                    size: asset.bytes,
                }),
                Err(e) => failed.push(FailedFile {
                    file_name: file.name.clone(),
                    error: e.to_string(),
                }),
            }
        }

        UploadSummary {
            total_uploaded: successful.len(),
            total_failed: failed.len(),
            total: files.len(),
            successful,
            failed,
        }
    }
}

fn allowed_content_type(file: &FileUpload) -> Result<&str, MediaError> {
    let essence = file
        .content_type
        .as_deref()
        .map(|value| value.split(';').next().unwrap_or(value).trim());

    match essence {
        Some(content_type) if ALLOWED_CONTENT_TYPES.contains(&content_type) => Ok(content_type),
        _ => Err(MediaError::UnsupportedType {
            content_type: file.content_type.clone(),
        }),
    }
}

/// Hex SHA-256 of the key-sorted `key=value` pairs joined by `&`, followed by
/// the secret.
pub fn sign(params: &[(&str, &str)], secret: &Secret) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by_key(|(key, _)| *key);
    let joined = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.expose().as_bytes());
    hex::encode(hasher.finalize())
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::testutils::{MockResponse, RecordedRequest, start_mock_upstream};
    use std::collections::HashMap;

    fn form_of(request: &RecordedRequest) -> HashMap<String, String> {
        url::form_urlencoded::parse(&request.body)
            .into_owned()
            .collect()
    }

    fn test_client(url: &str) -> MediaClient {
        MediaClient::new(&MediaConfig {
            api_url: Url::parse(url).unwrap(),
            cloud_name: "demo".to_string(),
            api_key: Secret::new("1234"),
            api_secret: Secret::new("abcd"),
            folder: "courier-uploads".to_string(),
            http_timeout_secs: 5,
        })
        .unwrap()
    }

    fn png(name: &str) -> FileUpload {
        FileUpload::new(name, &b"\x89PNG"[..]).with_content_type("image/png")
    }

    #[test]
    fn test_signature() {
        let secret = Secret::new("abcd");
        let signature = sign(
            &[("timestamp", "1700000000"), ("folder", "courier-uploads")],
            &secret,
        );
        assert_eq!(
            signature,
            "026e0738876741958345ac19218e90289ddbcc81ddaee9ac6c152fb7a45cf85e"
        );
    }

    #[tokio::test]
    async fn test_upload_sends_signed_data_uri() {
        let upstream = start_mock_upstream(|_| {
            MockResponse::json(
                200,
                json!({
                    "public_id": "courier-uploads/abc",
                    "secure_url": "https://cdn.test/abc.png",
                    "format": "png",
                    "width": 1,
                    "height": 1,
                    "bytes": 4,
                    "version": 1712
                }),
            )
        })
        .await;

        let asset = test_client(upstream.url())
            .upload(&png("logo.png"))
            .await
            .unwrap();
        assert_eq!(asset.secure_url, "https://cdn.test/abc.png");
        assert_eq!(asset.extra["version"], 1712);

        let requests = upstream.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, reqwest::Method::POST);
        assert_eq!(requests[0].path(), "/v1_1/demo/auto/upload");

        let form = form_of(&requests[0]);
        assert_eq!(form["file"], "data:image/png;base64,iVBORw==");
        assert_eq!(form["api_key"], "1234");
        assert_eq!(form["folder"], "courier-uploads");
        assert_eq!(form["signature_algorithm"], "sha256");
        assert!(!form.contains_key("api_secret"));

        let expected = sign(
            &[("folder", "courier-uploads"), ("timestamp", form["timestamp"].as_str())],
            &Secret::new("abcd"),
        );
        assert_eq!(form["signature"], expected);
    }

    #[tokio::test]
    async fn test_unsupported_type_never_reaches_the_cdn() {
        let upstream = start_mock_upstream(|_| MockResponse::json(200, "{}")).await;
        let client = test_client(upstream.url());

        let pdf = FileUpload::new("doc.pdf", &b"%PDF"[..]).with_content_type("application/pdf");
        let err = client.upload(&pdf).await.unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedType { .. }));

        let untyped = FileUpload::new("blob", &b"??"[..]);
        assert!(client.upload(&untyped).await.is_err());
        assert!(upstream.requests().is_empty());
    }

    #[tokio::test]
    async fn test_upload_many_collects_failures() {
        let upstream = start_mock_upstream(|request| {
            let form = form_of(request);
            if form["file"].starts_with("data:image/gif") {
                MockResponse::json(400, json!({"error": {"message": "Invalid image file"}}))
            } else {
                MockResponse::json(
                    200,
                    json!({"public_id": "p", "secure_url": "https://cdn.test/p", "bytes": 4}),
                )
            }
        })
        .await;

        let files = vec![
            png("a.png"),
            FileUpload::new("b.txt", &b"text"[..]).with_content_type("text/plain"),
            FileUpload::new("c.gif", &b"GIF8"[..]).with_content_type("image/gif"),
        ];
        let summary = test_client(upstream.url()).upload_many(&files).await;

        assert_eq!(summary.total, 3);
        assert_eq!(summary.total_uploaded, 1);
        assert_eq!(summary.total_failed, 2);
        assert_eq!(summary.successful[0].file_name, "a.png");
        assert_eq!(summary.successful[0].size, Some(4));
        assert_eq!(summary.failed[0].file_name, "b.txt");
        assert_eq!(summary.failed[1].file_name, "c.gif");
        assert!(summary.failed[1].error.contains("Invalid image file"));

        // the text file is rejected locally
        assert_eq!(upstream.requests().len(), 2);

        let body = serde_json::to_value(&summary).unwrap();
        assert_eq!(body["totalUploaded"], 1);
        assert_eq!(body["successful"][0]["publicId"], "p");
    }
}
