//! Wire types of the contents API.

use crate::types::{ChangeRecord, EntryKind, RemoteFile, WriteReceipt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub(crate) struct ContentsEntry {
    pub name: String,
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: EntryKind,
}

impl From<ContentsEntry> for RemoteFile {
    fn from(entry: ContentsEntry) -> Self {
        RemoteFile {
            name: entry.name,
            path: entry.path,
            version_marker: entry.sha,
            size_bytes: entry.size,
            content_url: entry.html_url,
            download_url: entry.download_url,
            kind: entry.kind,
        }
    }
}

/// A GET on a file path yields an object, on a directory an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ContentsListing {
    Directory(Vec<ContentsEntry>),
    File(ContentsEntry),
}

#[derive(Debug, Serialize)]
pub(crate) struct PutContentsBody<'a> {
    pub message: &'a str,
    /// Base64 of the raw file bytes
    pub content: String,
    pub branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitInfo {
    pub sha: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PutContentsResponse {
    pub content: ContentsEntry,
    pub commit: CommitInfo,
}

impl From<PutContentsResponse> for WriteReceipt {
    fn from(response: PutContentsResponse) -> Self {
        let commit = response.commit;
        WriteReceipt {
            file: response.content.into(),
            change: ChangeRecord {
                id: commit.sha,
                message: commit.message,
                url: commit.html_url.or(commit.url),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteContentsBody<'a> {
    pub message: &'a str,
    pub sha: &'a str,
    pub branch: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserInfo {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepoInfo {
    #[serde(default)]
    pub permissions: BTreeMap<String, bool>,
}

impl RepoInfo {
    pub fn granted_permissions(&self) -> Vec<String> {
        self.permissions
            .iter()
            .filter(|(_, granted)| **granted)
            .map(|(name, _)| name.clone())
            .collect()
    }
}
