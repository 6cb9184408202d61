use crate::config::StoreConfig;
use crate::errors::{Result, StoreError};
use crate::metrics_defs::STORE_REQUEST_DURATION;
use crate::protocol::{
    ContentsListing, DeleteContentsBody, ErrorBody, PutContentsBody, PutContentsResponse,
    RepoInfo, UserInfo,
};
use crate::types::{AccessReport, RemoteFile, WriteReceipt, WriteRequest};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use shared::histogram;
use std::future::Future;
use std::time::{Duration, Instant};
use url::Url;

/// Transport over a remote, path-addressed content store.
///
/// Implementations hold no state between calls: in particular no version
/// marker is ever cached, every caller gets what the store holds right now.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Current metadata of the file at `path`, or `None` if nothing is there.
    async fn lookup(&self, path: &str, branch: &str) -> Result<Option<RemoteFile>>;

    /// Create or update a file. A stale or missing marker yields
    /// [`StoreError::VersionConflict`].
    async fn write(&self, request: &WriteRequest) -> Result<WriteReceipt>;

    /// Delete the file at `path`, keyed by its current marker.
    async fn remove(&self, path: &str, message: &str, branch: &str) -> Result<()>;

    /// Entries of the directory at `path` (empty path is the root).
    async fn list(&self, path: &str, branch: &str) -> Result<Vec<RemoteFile>>;

    /// Checks that the credential authenticates and can see the repository.
    /// Never fails; problems are reported in the returned [`AccessReport`].
    async fn verify_access(&self) -> AccessReport;
}

/// [`FileStore`] backed by the GitHub-style `/repos/{owner}/{repo}/contents` API.
#[derive(Clone)]
pub struct ContentsClient {
    client: reqwest::Client,
    api_url: Url,
    owner: String,
    repo: String,
}

impl ContentsClient {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        if config.api_url.cannot_be_a_base() {
            return Err(StoreError::InvalidBaseUrl(config.api_url.to_string()));
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token.expose()))
            .map_err(|_| {
                StoreError::Validation("token contains invalid header characters".to_string())
            })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(ContentsClient {
            client,
            api_url: config.api_url.clone(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
        })
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidBaseUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `{api}/repos/{owner}/{repo}/contents/{path}` with each path segment escaped.
    fn contents_url(&self, path: &str) -> Result<Url> {
        let prefix = ["repos", self.owner.as_str(), self.repo.as_str(), "contents"];
        let path_segments = path.split('/').filter(|segment| !segment.is_empty());
        self.endpoint(prefix.into_iter().chain(path_segments))
    }

    async fn fetch<'a, T: DeserializeOwned>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(upstream_error(url.path(), response).await);
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl FileStore for ContentsClient {
    async fn lookup(&self, path: &str, branch: &str) -> Result<Option<RemoteFile>> {
        timed("lookup", async {
            let url = self.contents_url(path)?;
            let response = self.client.get(url).query(&[("ref", branch)]).send().await?;

            match response.status() {
                StatusCode::NOT_FOUND => {
                    tracing::debug!(path, branch, "File does not exist");
                    Ok(None)
                }
                status if status.is_success() => match response.json::<ContentsListing>().await? {
                    ContentsListing::File(entry) => {
                        tracing::debug!(path, branch, sha = %entry.sha, "File exists");
                        Ok(Some(entry.into()))
                    }
                    ContentsListing::Directory(_) => Err(StoreError::NotAFile {
                        path: path.to_string(),
                    }),
                },
                _ => Err(upstream_error(path, response).await),
            }
        })
        .await
    }

    async fn write(&self, request: &WriteRequest) -> Result<WriteReceipt> {
        timed("write", async {
            let url = self.contents_url(&request.path)?;
            let body = PutContentsBody {
                message: &request.commit_message,
                content: BASE64.encode(&request.content),
                branch: &request.branch,
                sha: request.expected_version_marker.as_deref(),
            };

            let response = self.client.put(url).json(&body).send().await?;
            let status = response.status();
            if status.is_success() {
                let created: PutContentsResponse = response.json().await?;
                return Ok(created.into());
            }

            let message = error_message(response).await;
            let path = request.path.clone();
            if is_version_conflict(status, &message) {
                Err(StoreError::VersionConflict {
                    path,
                    status: status.as_u16(),
                    message,
                })
            } else {
                Err(StoreError::Upstream {
                    path,
                    status: status.as_u16(),
                    message,
                })
            }
        })
        .await
    }

    async fn remove(&self, path: &str, message: &str, branch: &str) -> Result<()> {
        let current = self
            .lookup(path, branch)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })?;

        timed("remove", async {
            let url = self.contents_url(path)?;
            let body = DeleteContentsBody {
                message,
                sha: &current.version_marker,
                branch,
            };

            let response = self.client.delete(url).json(&body).send().await?;
            match response.status() {
                status if status.is_success() => Ok(()),
                StatusCode::NOT_FOUND => Err(StoreError::NotFound {
                    path: path.to_string(),
                }),
                status => {
                    let detail = error_message(response).await;
                    if is_version_conflict(status, &detail) {
                        Err(StoreError::VersionConflict {
                            path: path.to_string(),
                            status: status.as_u16(),
                            message: detail,
                        })
                    } else {
                        Err(StoreError::Upstream {
                            path: path.to_string(),
                            status: status.as_u16(),
                            message: detail,
                        })
                    }
                }
            }
        })
        .await
    }

    async fn list(&self, path: &str, branch: &str) -> Result<Vec<RemoteFile>> {
        timed("list", async {
            let url = self.contents_url(path)?;
            let response = self.client.get(url).query(&[("ref", branch)]).send().await?;

            match response.status() {
                StatusCode::NOT_FOUND => Err(StoreError::NotFound {
                    path: path.to_string(),
                }),
                status if status.is_success() => Ok(match response.json::<ContentsListing>().await? {
                    ContentsListing::Directory(entries) => {
                        entries.into_iter().map(RemoteFile::from).collect()
                    }
                    ContentsListing::File(entry) => vec![entry.into()],
                }),
                _ => Err(upstream_error(path, response).await),
            }
        })
        .await
    }

    async fn verify_access(&self) -> AccessReport {
        let user = match self.fetch::<UserInfo>(["user"]).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "Content store authentication failed");
                return AccessReport {
                    error: Some(format!("Authentication failed: {e}")),
                    ..AccessReport::default()
                };
            }
        };

        match self
            .fetch::<RepoInfo>(["repos", self.owner.as_str(), self.repo.as_str()])
            .await
        {
            Ok(repo) => AccessReport {
                authenticated: true,
                user: Some(user.login),
                repo_access: true,
                permissions: repo.granted_permissions(),
                error: None,
            },
            Err(e) => AccessReport {
                authenticated: true,
                user: Some(user.login),
                repo_access: false,
                permissions: Vec::new(),
                error: Some(format!("Repository access failed: {e}")),
            },
        }
    }
}

/// The store signals a stale marker with 409, and a marker missing for an
/// existing file with a 422 naming the `sha` field.
fn is_version_conflict(status: StatusCode, message: &str) -> bool {
    status == StatusCode::CONFLICT
        || (status == StatusCode::UNPROCESSABLE_ENTITY && message.contains("sha"))
}

async fn upstream_error(path: &str, response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    StoreError::Upstream {
        path: path.to_string(),
        status,
        message: error_message(response).await,
    }
}

/// The `message` field of a JSON error body, else the raw body, else the
/// canonical reason of the status.
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return e.to_string(),
    };

    serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .map(|body| body.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                text
            }
        })
}

async fn timed<T>(operation: &'static str, request: impl Future<Output = Result<T>>) -> Result<T> {
    let start = Instant::now();
    let result = request.await;
    let outcome = if result.is_ok() { "ok" } else { "error" };
    histogram!(STORE_REQUEST_DURATION, "operation" => operation, "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
    result
}
