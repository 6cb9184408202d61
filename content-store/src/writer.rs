//! Optimistic-concurrency create-or-update with bounded retries.

use crate::client::FileStore;
use crate::config::{LookupFailurePolicy, RetryConfig};
use crate::errors::{Result, StoreError};
use crate::metrics_defs::{STORE_RETRIES_EXHAUSTED, STORE_WRITE_ATTEMPTS, STORE_WRITE_CONFLICTS};
use crate::naming::resolve_target_path;
use crate::types::{FileUpload, WriteReceipt, WriteRequest};
use shared::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// How many times a conflicting write is attempted and how long to wait
/// in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never less than 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub on_lookup_failure: LookupFailurePolicy,
}

impl RetryPolicy {
    /// Linear backoff: the wait after failed attempt `attempt` (1-based).
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            on_lookup_failure: config.on_lookup_failure,
        }
    }
}

/// Where a single file's write currently stands.
///
/// `Checking` fetches the current marker, `Writing` submits with it,
/// `BackingOff` waits before the next `Checking`. `Succeeded` and `Failed`
/// are terminal.
#[derive(Debug)]
enum WriteState {
    Checking,
    Writing { expected_marker: Option<String> },
    BackingOff { delay: Duration },
    Succeeded(WriteReceipt),
    Failed(StoreError),
}

/// Runs the create-or-update protocol for one file at a time.
///
/// Each attempt re-reads the file's version marker right before writing, so
/// a retry never resubmits the marker that was just rejected.
#[derive(Clone)]
pub struct ConflictAwareWriter {
    store: Arc<dyn FileStore>,
    policy: RetryPolicy,
}

impl ConflictAwareWriter {
    pub fn new(store: Arc<dyn FileStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }

    /// Writes `file` to `target`. A `target` ending in `/` is a directory and
    /// gets a unique file name derived from `file.name`.
    pub async fn upload(
        &self,
        file: &FileUpload,
        target: &str,
        message: Option<&str>,
        branch: &str,
    ) -> Result<WriteReceipt> {
        if target.trim().is_empty() {
            return Err(StoreError::Validation("path is required".to_string()));
        }
        if branch.trim().is_empty() {
            return Err(StoreError::Validation("branch is required".to_string()));
        }
        if file.name.is_empty() && target.ends_with('/') {
            return Err(StoreError::Validation(
                "a file name is required to upload into a directory".to_string(),
            ));
        }

        let path = resolve_target_path(target, &file.name);
        let commit_message = message
            .map(str::to_string)
            .unwrap_or_else(|| format!("Upload {}", file.name));

        let mut attempt = 0;
        let mut state = WriteState::Checking;

        loop {
            state = match state {
                WriteState::Checking => {
                    attempt += 1;
                    match self.current_marker(&path, branch).await {
                        Ok(expected_marker) => WriteState::Writing { expected_marker },
                        Err(e) => WriteState::Failed(e),
                    }
                }
                WriteState::Writing { expected_marker } => {
                    let request = WriteRequest {
                        path: path.clone(),
                        content: file.content.clone(),
                        commit_message: commit_message.clone(),
                        branch: branch.to_string(),
                        expected_version_marker: expected_marker,
                    };
                    counter!(STORE_WRITE_ATTEMPTS).increment(1);
                    self.submit(&request, attempt).await
                }
                WriteState::BackingOff { delay } => {
                    sleep(delay).await;
                    WriteState::Checking
                }
                WriteState::Succeeded(receipt) => return Ok(receipt),
                WriteState::Failed(error) => return Err(error),
            };
        }
    }

    /// The marker to send with the next write, `None` meaning "create".
    async fn current_marker(&self, path: &str, branch: &str) -> Result<Option<String>> {
        match self.store.lookup(path, branch).await {
            Ok(existing) => Ok(existing.map(|file| file.version_marker)),
            Err(e) => match self.policy.on_lookup_failure {
                LookupFailurePolicy::AssumeAbsent => {
                    tracing::warn!(
                        path,
                        branch,
                        error = %e,
                        "Lookup failed, assuming the file does not exist"
                    );
                    Ok(None)
                }
                LookupFailurePolicy::Abort => Err(e),
            },
        }
    }

    async fn submit(&self, request: &WriteRequest, attempt: u32) -> WriteState {
        match self.store.write(request).await {
            Ok(receipt) => {
                tracing::debug!(
                    path = %receipt.file.path,
                    sha = %receipt.file.version_marker,
                    attempt,
                    "Write committed"
                );
                WriteState::Succeeded(receipt)
            }
            Err(e) if e.is_conflict() => {
                counter!(STORE_WRITE_CONFLICTS).increment(1);
                if attempt < self.policy.max_attempts {
                    let delay = self.policy.delay_after_attempt(attempt);
                    tracing::info!(
                        path = %request.path,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        had_marker = request.expected_version_marker.is_some(),
                        delay_ms = delay.as_millis() as u64,
                        "Version conflict, retrying with a fresh marker"
                    );
                    WriteState::BackingOff { delay }
                } else {
                    counter!(STORE_RETRIES_EXHAUSTED).increment(1);
                    tracing::warn!(path = %request.path, attempt, "Version conflict, giving up");
                    WriteState::Failed(StoreError::RetryExhausted {
                        path: request.path.clone(),
                        attempts: attempt,
                        message: e.to_string(),
                    })
                }
            }
            Err(e) => {
                tracing::error!(path = %request.path, attempt, error = %e, "Write failed");
                WriteState::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{FakeStore, StoreCall};
    use tokio::time::Instant;

    fn writer(store: &Arc<FakeStore>, max_attempts: u32) -> ConflictAwareWriter {
        ConflictAwareWriter::new(
            store.clone(),
            RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(100),
                on_lookup_failure: LookupFailurePolicy::AssumeAbsent,
            },
        )
    }

    fn hello() -> FileUpload {
        FileUpload::new("photo.png", &b"hello"[..])
    }

    #[test]
    fn test_backoff_is_linear_and_increasing() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after_attempt(2), Duration::from_millis(200));
        for n in 1..10 {
            assert!(policy.delay_after_attempt(n + 1) > policy.delay_after_attempt(n));
        }
    }

    #[test]
    fn test_policy_never_allows_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(RetryPolicy::from(&config).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_upload_into_directory_creates_unique_file() {
        let store = Arc::new(FakeStore::new());
        let receipt = writer(&store, 3)
            .upload(&hello(), "images/", None, "main")
            .await
            .unwrap();

        let stamp = receipt
            .file
            .path
            .strip_prefix("images/photo-")
            .and_then(|rest| rest.strip_suffix(".png"))
            .unwrap();
        assert!(!stamp.is_empty() && stamp.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(store.content(&receipt.file.path).unwrap().as_ref(), b"hello");
        assert_eq!(receipt.change.message, "Upload photo.png");

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].expected, None);
    }

    #[tokio::test]
    async fn test_existing_file_is_updated_with_its_marker() {
        let store = Arc::new(FakeStore::new().with_file("docs/a.txt", "old"));
        let current = store.marker("docs/a.txt").unwrap();

        writer(&store, 3)
            .upload(&hello(), "docs/a.txt", Some("Refresh"), "main")
            .await
            .unwrap();

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].expected.as_deref(), Some(current.as_str()));
        assert_eq!(store.content("docs/a.txt").unwrap().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_conflicts_below_bound_succeed() {
        for conflicts in 0..3 {
            let store = Arc::new(FakeStore::new());
            store.inject_conflicts("a.txt", conflicts);

            let result = writer(&store, 3)
                .upload(&hello(), "a.txt", None, "main")
                .await;

            assert!(result.is_ok(), "{conflicts} conflicts should be absorbed");
            assert_eq!(store.writes().len(), conflicts as usize + 1);
        }
    }

    #[tokio::test]
    async fn test_conflicts_at_bound_exhaust_retries() {
        for conflicts in [3, 4, 10] {
            let store = Arc::new(FakeStore::new());
            store.inject_conflicts("a.txt", conflicts);

            let err = writer(&store, 3)
                .upload(&hello(), "a.txt", None, "main")
                .await
                .unwrap_err();

            match err {
                StoreError::RetryExhausted { path, attempts, .. } => {
                    assert_eq!(path, "a.txt");
                    assert_eq!(attempts, 3);
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert_eq!(store.writes().len(), 3);
        }
    }

    #[tokio::test]
    async fn test_every_retry_uses_a_freshly_looked_up_marker() {
        let store = Arc::new(FakeStore::new().with_file("a.txt", "v0"));
        store.inject_conflicts("a.txt", 2);

        writer(&store, 3)
            .upload(&hello(), "a.txt", None, "main")
            .await
            .unwrap();

        // lookup, write, lookup, write, lookup, write
        let calls = store.calls();
        assert_eq!(calls.len(), 6);
        let mut last_rejected: Option<Option<String>> = None;
        for pair in calls.chunks(2) {
            let (found, sent) = match pair {
                [StoreCall::Lookup { found, .. }, StoreCall::Write { expected, .. }] => {
                    (found, expected)
                }
                other => panic!("unexpected call order: {other:?}"),
            };
            assert_eq!(found, sent, "write must use the marker of its own lookup");
            if let Some(rejected) = &last_rejected {
                assert_ne!(rejected, sent, "stale marker was resubmitted");
            }
            last_rejected = Some(sent.clone());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let store = Arc::new(FakeStore::new());
        store.inject_conflicts("a.txt", 2);

        let started = Instant::now();
        writer(&store, 3)
            .upload(&hello(), "a.txt", None, "main")
            .await
            .unwrap();

        // 100ms after the first conflict, 200ms after the second
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_lookup_failure_falls_back_to_create() {
        let store = Arc::new(FakeStore::new());
        store.fail_lookups(503);

        writer(&store, 3)
            .upload(&hello(), "a.txt", None, "main")
            .await
            .unwrap();

        assert_eq!(store.writes()[0].expected, None);
    }

    #[tokio::test]
    async fn test_lookup_failure_aborts_when_configured() {
        let store = Arc::new(FakeStore::new());
        store.fail_lookups(503);

        let writer = ConflictAwareWriter::new(
            store.clone(),
            RetryPolicy {
                on_lookup_failure: LookupFailurePolicy::Abort,
                ..RetryPolicy::default()
            },
        );
        let err = writer
            .upload(&hello(), "a.txt", None, "main")
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Upstream { status: 503, .. }));
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_non_conflict_errors_are_not_retried() {
        let store = Arc::new(FakeStore::new());
        store.fail_writes(500);

        let err = writer(&store, 3)
            .upload(&hello(), "a.txt", None, "main")
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Upstream { status: 500, .. }));
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_the_store() {
        let store = Arc::new(FakeStore::new());
        let writer = writer(&store, 3);

        let err = writer.upload(&hello(), "", None, "main").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let nameless = FileUpload::new("", &b"x"[..]);
        let err = writer
            .upload(&nameless, "images/", None, "main")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        assert!(store.calls().is_empty());
    }
}
