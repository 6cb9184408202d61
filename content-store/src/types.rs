use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    File,
    Dir,
    Symlink,
    Submodule,
}

/// An object stored at `path` on some branch of the content store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub path: String,
    /// Changes on every write; the optimistic-concurrency token for updates
    pub version_marker: String,
    pub size_bytes: u64,
    pub content_url: Option<String>,
    pub download_url: Option<String>,
    pub kind: EntryKind,
}

/// The commit a successful write produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeRecord {
    pub id: String,
    pub message: String,
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteReceipt {
    pub file: RemoteFile,
    pub change: ChangeRecord,
}

/// A single create-or-update submitted to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRequest {
    pub path: String,
    pub content: Bytes,
    pub commit_message: String,
    pub branch: String,
    /// `None` asks the store to create the file; `Some` updates it only if
    /// the current marker still matches.
    pub expected_version_marker: Option<String>,
}

/// File content as handed over by a caller, with its original name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileUpload {
    pub name: String,
    pub content: Bytes,
    pub content_type: Option<String>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        FileUpload {
            name: name.into(),
            content: content.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Outcome of checking the configured credential against the store.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessReport {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub repo_access: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
