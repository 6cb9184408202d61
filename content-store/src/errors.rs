use thiserror::Error;

/// Result type alias for content store operations
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors that can occur while talking to the content store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{path} not found")]
    NotFound { path: String },

    #[error("{path} is a directory, not a file")]
    NotAFile { path: String },

    /// The supplied version marker was stale or missing. Retryable.
    #[error("version conflict writing {path}: {status} {message}")]
    VersionConflict {
        path: String,
        status: u16,
        message: String,
    },

    #[error("writing {path} still conflicted after {attempts} attempts: {message}")]
    RetryExhausted {
        path: String,
        attempts: u32,
        message: String,
    },

    #[error("content store returned {status} for {path}: {message}")]
    Upstream {
        path: String,
        status: u16,
        message: String,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid content store base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("invalid request: {0}")]
    Validation(String),
}

impl StoreError {
    /// True for the one failure the writer is allowed to retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }

    /// Upstream status code, when the store answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            StoreError::VersionConflict { status, .. } | StoreError::Upstream { status, .. } => {
                Some(*status)
            }
            StoreError::NotFound { .. } => Some(404),
            StoreError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_version_conflicts_are_retryable() {
        let conflict = StoreError::VersionConflict {
            path: "a.txt".into(),
            status: 409,
            message: "a.txt does not match".into(),
        };
        assert!(conflict.is_conflict());
        assert_eq!(conflict.status_code(), Some(409));

        let exhausted = StoreError::RetryExhausted {
            path: "a.txt".into(),
            attempts: 3,
            message: "a.txt does not match".into(),
        };
        assert!(!exhausted.is_conflict());
        assert_eq!(
            exhausted.to_string(),
            "writing a.txt still conflicted after 3 attempts: a.txt does not match"
        );

        let upstream = StoreError::Upstream {
            path: "a.txt".into(),
            status: 502,
            message: "Bad Gateway".into(),
        };
        assert!(!upstream.is_conflict());
        assert_eq!(upstream.status_code(), Some(502));
    }
}
