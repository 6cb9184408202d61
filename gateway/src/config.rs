use content_store::StoreConfig;
use serde::Deserialize;
use shared::secret::Secret;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Listener and admin listener cannot share {0}")]
    DuplicateListener(String),

    #[error("max_body_bytes cannot be 0")]
    NoBodyAllowed,

    #[error("api_key is set but empty")]
    EmptyApiKey,

    #[error("content_store: {0}")]
    ContentStore(#[from] content_store::config::ValidationError),

    #[error("media: {0} is empty")]
    EmptyMediaSetting(&'static str),

    #[error("messaging: bot_token is empty")]
    EmptyBotToken,

    #[error("{section}: API URL cannot be a base: {url}")]
    InvalidApiUrl { section: &'static str, url: String },
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the public API
    #[serde(default = "default_listener")]
    pub listener: Listener,
    /// Listener for health and readiness probes
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    /// Shared secret required on every route except the index. Unset
    /// disables authentication.
    #[serde(default)]
    pub api_key: Option<Secret>,
    /// Requests with a larger body are rejected with 413
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Backend of the `/github/*` routes
    #[serde(default)]
    pub content_store: Option<StoreConfig>,
    /// Backend of `/upload` and `/upload-multiple`
    #[serde(default)]
    pub media: Option<MediaConfig>,
    /// Backend of the `/telegram/*` routes
    #[serde(default)]
    pub messaging: Option<MessagingConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: default_listener(),
            admin_listener: default_admin_listener(),
            api_key: None,
            max_body_bytes: default_max_body_bytes(),
            content_store: None,
            media: None,
            messaging: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        if self.listener == self.admin_listener {
            return Err(ValidationError::DuplicateListener(format!(
                "{}:{}",
                self.listener.host, self.listener.port
            )));
        }

        if self.max_body_bytes == 0 {
            return Err(ValidationError::NoBodyAllowed);
        }
        if self.api_key.as_ref().is_some_and(Secret::is_empty) {
            return Err(ValidationError::EmptyApiKey);
        }

        if let Some(store) = &self.content_store {
            store.validate()?;
        }
        if let Some(media) = &self.media {
            media.validate()?;
        }
        if let Some(messaging) = &self.messaging {
            messaging.validate()?;
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Signed-upload settings of the media CDN.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MediaConfig {
    #[serde(default = "default_media_api_url")]
    pub api_url: Url,
    pub cloud_name: String,
    pub api_key: Secret,
    /// Signs upload parameters; never sent over the wire
    pub api_secret: Secret,
    /// Folder every asset is uploaded into
    #[serde(default = "default_media_folder")]
    pub folder: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl MediaConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cloud_name.trim().is_empty() {
            return Err(ValidationError::EmptyMediaSetting("cloud_name"));
        }
        if self.api_key.is_empty() {
            return Err(ValidationError::EmptyMediaSetting("api_key"));
        }
        if self.api_secret.is_empty() {
            return Err(ValidationError::EmptyMediaSetting("api_secret"));
        }
        if self.api_url.cannot_be_a_base() {
            return Err(ValidationError::InvalidApiUrl {
                section: "media",
                url: self.api_url.to_string(),
            });
        }
        Ok(())
    }
}

/// Bot API settings of the messaging service.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MessagingConfig {
    #[serde(default = "default_messaging_api_url")]
    pub api_url: Url,
    pub bot_token: Secret,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl MessagingConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.bot_token.is_empty() {
            return Err(ValidationError::EmptyBotToken);
        }
        if self.api_url.cannot_be_a_base() {
            return Err(ValidationError::InvalidApiUrl {
                section: "messaging",
                url: self.api_url.to_string(),
            });
        }
        Ok(())
    }
}

fn default_listener() -> Listener {
    Listener {
        host: "127.0.0.1".to_string(),
        port: 3000,
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".to_string(),
        port: 3001,
    }
}

fn default_max_body_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_media_api_url() -> Url {
    Url::parse("https://api.cloudinary.com").expect("valid default URL")
}

fn default_media_folder() -> String {
    "courier-uploads".to_string()
}

fn default_messaging_api_url() -> Url {
    Url::parse("https://api.telegram.org").expect("valid default URL")
}

fn default_http_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use content_store::config::LookupFailurePolicy;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.listener.port, 3000);
        assert_eq!(config.admin_listener.port, 3001);
        assert_eq!(config.max_body_bytes, 25 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
listener:
    host: 0.0.0.0
    port: 8080
admin_listener:
    host: 0.0.0.0
    port: 8081
api_key: s3cret
max_body_bytes: 1048576
content_store:
    token: ghp_token
    owner: octo
    repo: storage
    default_branch: trunk
    retry:
        max_attempts: 5
        base_delay_ms: 50
        on_lookup_failure: abort
media:
    cloud_name: demo
    api_key: "1234"
    api_secret: shh
messaging:
    api_url: http://localhost:9000
    bot_token: "123:abc"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.api_key.as_ref().unwrap().expose(), "s3cret");

        let store = config.content_store.unwrap();
        assert_eq!(store.default_branch, "trunk");
        assert_eq!(store.api_url.as_str(), "https://api.github.com/");
        assert_eq!(store.retry.max_attempts, 5);
        assert_eq!(store.retry.on_lookup_failure, LookupFailurePolicy::Abort);

        let media = config.media.unwrap();
        assert_eq!(media.folder, "courier-uploads");
        assert_eq!(media.api_url.as_str(), "https://api.cloudinary.com/");

        let messaging = config.messaging.unwrap();
        assert_eq!(messaging.api_url.as_str(), "http://localhost:9000/");
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::default();
        config.listener.port = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidPort));

        let mut config = Config::default();
        config.admin_listener = config.listener.clone();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::DuplicateListener(_))
        ));

        let config = Config {
            api_key: Some(Secret::new("")),
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::EmptyApiKey));

        let mut store = StoreConfig::new("token", "octo", "storage");
        store.retry.max_attempts = 0;
        let config = Config {
            content_store: Some(store),
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::ContentStore(
                content_store::config::ValidationError::NoAttempts
            ))
        );

        let yaml = r#"
messaging:
    bot_token: "  "
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.validate(), Err(ValidationError::EmptyBotToken));
    }

    #[test]
    fn test_invalid_url_is_rejected_at_parse_time() {
        let yaml = r#"
messaging:
    api_url: "not a url"
    bot_token: "123:abc"
"#;
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }
}
