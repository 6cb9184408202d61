use super::files::FileData;
use crate::errors::{GatewayError, Result};
use content_store::FileUpload;
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use hyper::{Response, StatusCode, Uri};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::http::{full_body, make_boxed_error_response};

pub type HandlerBody = BoxBody<Bytes, GatewayError>;

/// Deserializes a JSON request body into the specified type.
pub fn deserialize_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::BadRequest(format!("Invalid JSON body: {e}")))
}

/// Serializes a value to a JSON body.
pub fn serialize_to_body<T: Serialize>(value: &T) -> Result<HandlerBody> {
    let bytes = serde_json::to_vec(value).map(Bytes::from)?;
    Ok(full_body(bytes))
}

pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<HandlerBody>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .body(serialize_to_body(value)?)
        .map_err(|e| GatewayError::Internal(format!("Failed to build response: {e}")))
}

/// First value of query parameter `name`, percent-decoded.
pub fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    details: String,
    #[serde(flatten)]
    batch: Option<BatchFailure>,
}

/// Where a batch stopped and what it had committed by then.
#[derive(Serialize)]
struct BatchFailure {
    failed_file: String,
    failed_index: usize,
    committed: Vec<FileData>,
}

/// JSON error envelope for `error`, with `summary` as its `error` field.
pub fn make_error_response(error: &GatewayError, summary: &str) -> Response<HandlerBody> {
    let status = error.status_code();
    let batch = match error {
        GatewayError::Batch(e) => Some(BatchFailure {
            failed_file: e.name.clone(),
            failed_index: e.index,
            committed: e.committed.iter().map(FileData::from).collect(),
        }),
        _ => None,
    };
    let body = ErrorBody {
        success: false,
        error: summary,
        details: error.to_string(),
        batch,
    };

    match json_response(status, &body) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize error response");
            make_boxed_error_response(status)
        }
    }
}

/// Text fields and file parts of a `multipart/form-data` body, in order.
#[derive(Debug, Default)]
pub struct FormData {
    fields: Vec<(String, String)>,
    files: Vec<(String, FileUpload)>,
}

impl FormData {
    /// First non-blank text field called `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.trim())
            .find(|value| !value.is_empty())
    }

    /// Removes and returns the file parts sent under any of `names`.
    pub fn take_files(&mut self, names: &[&str]) -> Vec<FileUpload> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|(key, _)| names.contains(&key.as_str()));
        self.files = kept;
        taken.into_iter().map(|(_, file)| file).collect()
    }

    /// Removes and returns every file part.
    pub fn take_all_files(&mut self) -> Vec<FileUpload> {
        std::mem::take(&mut self.files)
            .into_iter()
            .map(|(_, file)| file)
            .collect()
    }
}

/// Parses a buffered `multipart/form-data` body.
///
/// Parts with a file name are files; empty file parts, as browsers send for
/// an untouched file input, are skipped.
pub async fn parse_multipart(headers: &HeaderMap, body: Bytes) -> Result<FormData> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| GatewayError::BadRequest("Expected a multipart/form-data body".into()))?;
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| GatewayError::BadRequest(format!("Expected a multipart/form-data body: {e}")))?;

    let stream = futures::stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut form = FormData::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field.content_type().map(|mime| mime.to_string());
                let content = field.bytes().await.map_err(multipart_error)?;
                if file_name.is_empty() && content.is_empty() {
                    continue;
                }
                let mut file = FileUpload::new(file_name, content);
                file.content_type = content_type;
                form.files.push((name, file));
            }
            None => {
                let value = field.text().await.map_err(multipart_error)?;
                form.fields.push((name, value));
            }
        }
    }

    Ok(form)
}

fn multipart_error(error: multer::Error) -> GatewayError {
    GatewayError::BadRequest(format!("Malformed multipart body: {error}"))
}

#[cfg(test)]
pub(crate) mod testing {
    /// Builds a `multipart/form-data` body. Parts with a file name are files.
    pub fn multipart_body(
        boundary: &str,
        parts: &[(&str, Option<(&str, &str)>, &[u8])],
    ) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, file, content) in parts {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match file {
                Some((file_name, content_type)) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                }
                None => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                    );
                }
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        body
    }
}

#[cfg(test)]
mod tests {
    use super::testing::multipart_body;
    use super::*;
    use http_body_util::BodyExt;

    fn multipart_headers(boundary: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&format!("multipart/form-data; boundary={boundary}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_parse_multipart() {
        let body = multipart_body(
            "XyZ",
            &[
                ("path", None, &b"images/"[..]),
                ("file", Some(("a.png", "image/png")), &b"\x89PNG"[..]),
                ("files", Some(("b.txt", "text/plain")), &b"hello"[..]),
                ("file", Some(("", "application/octet-stream")), &b""[..]),
                ("message", None, &b"  "[..]),
            ],
        );

        let mut form = parse_multipart(&multipart_headers("XyZ"), Bytes::from(body))
            .await
            .unwrap();

        assert_eq!(form.field("path"), Some("images/"));
        assert_eq!(form.field("message"), None);
        assert_eq!(form.field("branch"), None);

        let files = form.take_files(&["file"]);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.png");
        assert_eq!(files[0].content_type.as_deref(), Some("image/png"));
        assert_eq!(files[0].content.as_ref(), b"\x89PNG");

        let rest = form.take_all_files();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].name, "b.txt");
    }

    #[tokio::test]
    async fn test_parse_multipart_requires_boundary() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let err = parse_multipart(&headers, Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));

        let err = parse_multipart(&HeaderMap::new(), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[test]
    fn test_query_param() {
        let uri: Uri = "/github/list?path=images%2Fcats&branch=dev".parse().unwrap();
        assert_eq!(query_param(&uri, "path").as_deref(), Some("images/cats"));
        assert_eq!(query_param(&uri, "branch").as_deref(), Some("dev"));
        assert_eq!(query_param(&uri, "offset"), None);

        let bare: Uri = "/github/list".parse().unwrap();
        assert_eq!(query_param(&bare, "path"), None);
    }

    #[tokio::test]
    async fn test_error_envelope() {
        let error = GatewayError::BadRequest("Path is required".into());
        let response = make_error_response(&error, "Upload failed");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "success": false,
                "error": "Upload failed",
                "details": "Path is required"
            })
        );
    }
}
