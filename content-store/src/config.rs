use serde::Deserialize;
use shared::secret::Secret;
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_USER_AGENT: &str = "courier";

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("content store token is empty")]
    EmptyToken,

    #[error("content store owner is empty")]
    EmptyOwner,

    #[error("content store repo is empty")]
    EmptyRepo,

    #[error("content store default branch is empty")]
    EmptyBranch,

    #[error("retry.max_attempts must be at least 1")]
    NoAttempts,

    #[error("content store API URL cannot be a base: {0}")]
    InvalidApiUrl(String),
}

/// What the writer does when the pre-write lookup itself fails.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LookupFailurePolicy {
    /// Log and proceed as if the file did not exist. A wrong guess surfaces
    /// as a version conflict on the write and is retried.
    #[default]
    AssumeAbsent,
    /// Propagate the lookup error and stop.
    Abort,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total write attempts per file, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff before attempt `n + 1` is `base_delay_ms * n`
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default)]
    pub on_lookup_failure: LookupFailurePolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            on_lookup_failure: LookupFailurePolicy::default(),
        }
    }
}

/// Connection settings for the remote content store.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Base URL of the store API
    #[serde(default = "default_api_url")]
    pub api_url: Url,
    /// Bearer credential sent on every request
    pub token: Secret,
    pub owner: String,
    pub repo: String,
    /// Branch used when a request does not name one
    #[serde(default = "default_branch")]
    pub default_branch: String,
    /// Client identifier the upstream requires on every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl StoreConfig {
    pub fn new(token: impl Into<String>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        StoreConfig {
            api_url: default_api_url(),
            token: Secret::new(token),
            owner: owner.into(),
            repo: repo.into(),
            default_branch: default_branch(),
            user_agent: default_user_agent(),
            http_timeout_secs: default_http_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.token.is_empty() {
            return Err(ValidationError::EmptyToken);
        }
        if self.owner.trim().is_empty() {
            return Err(ValidationError::EmptyOwner);
        }
        if self.repo.trim().is_empty() {
            return Err(ValidationError::EmptyRepo);
        }
        if self.default_branch.trim().is_empty() {
            return Err(ValidationError::EmptyBranch);
        }
        if self.retry.max_attempts == 0 {
            return Err(ValidationError::NoAttempts);
        }
        if self.api_url.cannot_be_a_base() {
            return Err(ValidationError::InvalidApiUrl(self.api_url.to_string()));
        }
        Ok(())
    }
}

fn default_api_url() -> Url {
    Url::parse(DEFAULT_API_URL).expect("default API URL is valid")
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
token: ghp_example
owner: octo
repo: storage
"#;
        let config: StoreConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.api_url.as_str(), "https://api.github.com/");
        assert_eq!(config.default_branch, "main");
        assert_eq!(config.user_agent, "courier");
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 100);
        assert_eq!(
            config.retry.on_lookup_failure,
            LookupFailurePolicy::AssumeAbsent
        );
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
api_url: "https://git.example.com/api/v3"
token: ghp_example
owner: octo
repo: storage
default_branch: assets
user_agent: courier-staging
http_timeout_secs: 5
retry:
    max_attempts: 5
    base_delay_ms: 250
    on_lookup_failure: abort
"#;
        let config: StoreConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.api_url.path(), "/api/v3");
        assert_eq!(config.default_branch, "assets");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.on_lookup_failure, LookupFailurePolicy::Abort);
    }

    #[test]
    fn test_validation_errors() {
        let base = StoreConfig::new("ghp_example", "octo", "storage");
        assert!(base.validate().is_ok());

        let mut config = base.clone();
        config.token = Secret::new("");
        assert_eq!(config.validate(), Err(ValidationError::EmptyToken));

        let mut config = base.clone();
        config.owner = " ".into();
        assert_eq!(config.validate(), Err(ValidationError::EmptyOwner));

        let mut config = base.clone();
        config.repo = "".into();
        assert_eq!(config.validate(), Err(ValidationError::EmptyRepo));

        let mut config = base.clone();
        config.retry.max_attempts = 0;
        assert_eq!(config.validate(), Err(ValidationError::NoAttempts));

        let mut config = base;
        config.api_url = Url::parse("mailto:ops@example.com").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidApiUrl(_))
        ));
    }

    #[test]
    fn test_deserialization_errors() {
        // Invalid URL
        assert!(
            serde_yaml::from_str::<StoreConfig>(
                "{api_url: not-a-url, token: t, owner: o, repo: r}"
            )
            .is_err()
        );

        // Missing credential
        assert!(serde_yaml::from_str::<StoreConfig>("{owner: o, repo: r}").is_err());

        // Unknown lookup policy
        assert!(serde_yaml::from_str::<LookupFailurePolicy>("ignore").is_err());
    }
}
