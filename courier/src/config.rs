use gateway::config::{Config as GatewayConfig, ValidationError};
use serde::Deserialize;
use std::fs::File;

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set
    #[serde(default = "default_log_level")]
    pub level: String,
    pub sentry_dsn: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            sentry_dsn: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.gateway.validate()?;

        Ok(config)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid gateway config: {0}")]
    Invalid(#[from] ValidationError),
}

fn default_metrics_prefix() -> String {
    "courier".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn full_config() {
        let yaml = r#"
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            logging:
                level: debug
                sentry_dsn: https://key@sentry.example.com/1
            gateway:
                listener:
                    host: 0.0.0.0
                    port: 8080
                api_key: s3cret
                content_store:
                    token: ghp_abc
                    owner: acme
                    repo: assets
                    retry:
                        max_attempts: 5
                messaging:
                    bot_token: "42:xyz"
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        let metrics = config.common.metrics.expect("metrics config");
        assert_eq!(metrics.statsd_port, 8125);
        assert_eq!(metrics.prefix, "courier");
        assert_eq!(config.common.logging.level, "debug");
        assert!(config.common.logging.sentry_dsn.is_some());

        assert_eq!(config.gateway.listener.port, 8080);
        assert_eq!(config.gateway.admin_listener.port, 3001);
        let store = config.gateway.content_store.expect("content store");
        assert_eq!(store.owner, "acme");
        assert_eq!(store.retry.max_attempts, 5);
        assert!(config.gateway.media.is_none());
        assert!(config.gateway.messaging.is_some());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let tmp = write_tmp_file("{}");
        let config = Config::from_file(tmp.path()).expect("load config");
        assert!(config.common.metrics.is_none());
        assert_eq!(config.common.logging.level, "info");
        assert_eq!(config.gateway.listener.port, 3000);
        assert!(config.gateway.api_key.is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let yaml = r#"
            gateway:
                content_store:
                    token: ghp_abc
                    owner: ""
                    repo: assets
            "#;
        let tmp = write_tmp_file(yaml);
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::Invalid(_))
        ));

        let tmp = write_tmp_file("gateway: [not, a, map]");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::ParseError(_))
        ));

        assert!(matches!(
            Config::from_file(std::path::Path::new("/nonexistent/courier.yaml")),
            Err(ConfigError::LoadError(_))
        ));
    }
}
