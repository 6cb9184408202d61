//! In-memory [`FileStore`] with scriptable conflicts and failures.

use crate::client::FileStore;
use crate::errors::{Result, StoreError};
use crate::types::{
    AccessReport, ChangeRecord, EntryKind, RemoteFile, WriteReceipt, WriteRequest,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Every call the store received, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreCall {
    Lookup {
        path: String,
        found: Option<String>,
    },
    Write {
        path: String,
        expected: Option<String>,
    },
    Remove {
        path: String,
    },
    List {
        path: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteCall {
    pub path: String,
    pub expected: Option<String>,
}

struct StoredFile {
    content: Bytes,
    marker: String,
}

#[derive(Default)]
struct State {
    files: BTreeMap<String, StoredFile>,
    /// (path prefix, conflicts left to inject)
    conflicts: Vec<(String, u32)>,
    lookup_failure: Option<u16>,
    write_failure: Option<u16>,
    access_denied: bool,
    calls: Vec<StoreCall>,
    version: u64,
}

impl State {
    fn next_marker(&mut self) -> String {
        self.version += 1;
        format!("v{}", self.version)
    }

    fn take_conflict(&mut self, path: &str) -> bool {
        match self
            .conflicts
            .iter_mut()
            .find(|(prefix, left)| *left > 0 && path.starts_with(prefix.as_str()))
        {
            Some((_, left)) => {
                *left -= 1;
                true
            }
            None => false,
        }
    }
}

/// Behaves like the contents API: writes are checked against the current
/// version marker and every successful write changes it.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let marker = state.next_marker();
            state.files.insert(
                path.to_string(),
                StoredFile {
                    content: Bytes::copy_from_slice(content.as_bytes()),
                    marker,
                },
            );
        }
        self
    }

    /// The next `count` writes to any path starting with `prefix` lose a race:
    /// another writer commits first, changing the marker, and the write is
    /// rejected with a conflict.
    pub fn inject_conflicts(&self, prefix: &str, count: u32) {
        self.state
            .lock()
            .unwrap()
            .conflicts
            .push((prefix.to_string(), count));
    }

    /// Every lookup fails with an upstream error of `status`.
    pub fn fail_lookups(&self, status: u16) {
        self.state.lock().unwrap().lookup_failure = Some(status);
    }

    /// Every write fails with an upstream error of `status`.
    pub fn fail_writes(&self, status: u16) {
        self.state.lock().unwrap().write_failure = Some(status);
    }

    /// Access verification reports a rejected credential.
    pub fn deny_access(&self) {
        self.state.lock().unwrap().access_denied = true;
    }

    pub fn marker(&self, path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.files.get(path).map(|file| file.marker.clone())
    }

    pub fn content(&self, path: &str) -> Option<Bytes> {
        let state = self.state.lock().unwrap();
        state.files.get(path).map(|file| file.content.clone())
    }

    pub fn paths(&self) -> Vec<String> {
        self.state.lock().unwrap().files.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn writes(&self) -> Vec<WriteCall> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Write { path, expected } => Some(WriteCall { path, expected }),
                _ => None,
            })
            .collect()
    }
}

fn remote_file(path: &str, file: &StoredFile) -> RemoteFile {
    RemoteFile {
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        path: path.to_string(),
        version_marker: file.marker.clone(),
        size_bytes: file.content.len() as u64,
        content_url: Some(format!("https://store.test/blob/{path}")),
        download_url: Some(format!("https://raw.store.test/{path}")),
        kind: EntryKind::File,
    }
}

#[async_trait]
impl FileStore for FakeStore {
    async fn lookup(&self, path: &str, _branch: &str) -> Result<Option<RemoteFile>> {
        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.lookup_failure {
            state.calls.push(StoreCall::Lookup {
                path: path.to_string(),
                found: None,
            });
            return Err(StoreError::Upstream {
                path: path.to_string(),
                status,
                message: "lookup failed".to_string(),
            });
        }

        let found = state.files.get(path).map(|file| remote_file(path, file));
        state.calls.push(StoreCall::Lookup {
            path: path.to_string(),
            found: found.as_ref().map(|file| file.version_marker.clone()),
        });
        Ok(found)
    }

    async fn write(&self, request: &WriteRequest) -> Result<WriteReceipt> {
        let mut state = self.state.lock().unwrap();
        let path = request.path.clone();
        state.calls.push(StoreCall::Write {
            path: path.clone(),
            expected: request.expected_version_marker.clone(),
        });

        if let Some(status) = state.write_failure {
            return Err(StoreError::Upstream {
                path,
                status,
                message: "write failed".to_string(),
            });
        }

        if state.take_conflict(&path) {
            let marker = state.next_marker();
            state.files.insert(
                path.clone(),
                StoredFile {
                    content: Bytes::from_static(b"written by someone else"),
                    marker,
                },
            );
            return Err(StoreError::VersionConflict {
                path: path.clone(),
                status: 409,
                message: format!("{path} does not match"),
            });
        }

        let current = state.files.get(&path).map(|file| file.marker.as_str());
        if current != request.expected_version_marker.as_deref() {
            let (status, message) = match current {
                Some(_) if request.expected_version_marker.is_none() => {
                    (422, "Invalid request. \"sha\" wasn't supplied.".to_string())
                }
                _ => (409, format!("{path} does not match")),
            };
            return Err(StoreError::VersionConflict {
                path,
                status,
                message,
            });
        }

        let marker = state.next_marker();
        let change_id = format!("change-{}", state.version);
        let file = StoredFile {
            content: request.content.clone(),
            marker,
        };
        let remote = remote_file(&path, &file);
        state.files.insert(path, file);

        Ok(WriteReceipt {
            file: remote,
            change: ChangeRecord {
                id: change_id,
                message: request.commit_message.clone(),
                url: None,
            },
        })
    }

    async fn remove(&self, path: &str, _message: &str, _branch: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(StoreCall::Remove {
            path: path.to_string(),
        });
        match state.files.remove(path) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    async fn list(&self, path: &str, _branch: &str) -> Result<Vec<RemoteFile>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(StoreCall::List {
            path: path.to_string(),
        });

        let dir = path.trim_matches('/');
        let entries: Vec<RemoteFile> = state
            .files
            .iter()
            .filter(|(file_path, _)| {
                let parent = file_path.rsplit_once('/').map_or("", |(parent, _)| parent);
                parent == dir
            })
            .map(|(file_path, file)| remote_file(file_path, file))
            .collect();

        if entries.is_empty() && !dir.is_empty() {
            return Err(StoreError::NotFound {
                path: path.to_string(),
            });
        }
        Ok(entries)
    }

    async fn verify_access(&self) -> AccessReport {
        if self.state.lock().unwrap().access_denied {
            return AccessReport {
                error: Some("Authentication failed: Bad credentials".to_string()),
                ..AccessReport::default()
            };
        }
        AccessReport {
            authenticated: true,
            user: Some("fake".to_string()),
            repo_access: true,
            permissions: vec!["pull".to_string(), "push".to_string()],
            error: None,
        }
    }
}
