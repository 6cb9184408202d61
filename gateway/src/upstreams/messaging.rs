//! Bot API client of the messaging service.

use super::http_client;
use crate::config::MessagingConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Messaging API error: {description}")]
    Api { description: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid messaging API URL: {0}")]
    InvalidUrl(String),
}

/// A numeric chat id, or `@channelname` for public channels.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ChatId {
    Id(i64),
    Username(String),
}

/// Every bot API reply is wrapped in this envelope.
#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a ChatId,
    text: &'a str,
}

pub struct BotClient {
    client: reqwest::Client,
    api_url: Url,
    bot_token: String,
}

impl BotClient {
    pub fn new(config: &MessagingConfig) -> Result<Self, MessagingError> {
        if config.api_url.cannot_be_a_base() {
            return Err(MessagingError::InvalidUrl(config.api_url.to_string()));
        }
        Ok(BotClient {
            client: http_client(config.http_timeout_secs)?,
            api_url: config.api_url.clone(),
            bot_token: config.bot_token.expose().to_string(),
        })
    }

    /// Pending updates, oldest first. `offset` acknowledges everything before it.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        limit: u32,
        timeout: u32,
    ) -> Result<Vec<Value>, MessagingError> {
        let mut query = Vec::with_capacity(3);
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }
        query.push(("limit", limit.to_string()));
        query.push(("timeout", timeout.to_string()));

        let request = self.client.get(self.method_url("getUpdates")?).query(&query);
        self.call(request).await
    }

    pub async fn get_me(&self) -> Result<Value, MessagingError> {
        let request = self.client.get(self.method_url("getMe")?);
        self.call(request).await
    }

    pub async fn send_message(&self, chat_id: &ChatId, text: &str) -> Result<Value, MessagingError> {
        let request = self
            .client
            .post(self.method_url("sendMessage")?)
            .json(&SendMessage { chat_id, text });
        self.call(request).await
    }

    /// `{api_url}/bot{token}/{method}`
    fn method_url(&self, method: &str) -> Result<Url, MessagingError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| MessagingError::InvalidUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .push(&format!("bot{}", self.bot_token))
            .push(method);
        Ok(url)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, MessagingError> {
        // The bot API answers errors with a non-2xx status and the same
        // envelope, so the body is parsed regardless of status.
        let response = request.send().await?;
        let status = response.status();
        let envelope: Envelope<T> = response.json().await?;

        match envelope {
            Envelope {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            Envelope { description, .. } => {
                let description = description.unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                });
                tracing::warn!(status = status.as_u16(), %description, "Messaging API call failed");
                Err(MessagingError::Api { description })
            }
        }
    }
}
