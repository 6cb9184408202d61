//! `/telegram/*`: bot updates, bot info and outgoing messages.

use super::utils::{HandlerBody, deserialize_body, json_response, query_param};
use crate::errors::{GatewayError, Result};
use crate::upstreams::messaging::{BotClient, ChatId};
use hyper::body::Bytes;
use hyper::{Request, Response, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_UPDATE_LIMIT: u32 = 100;
const DEFAULT_UPDATE_TIMEOUT: u32 = 0;

#[derive(Serialize)]
struct Updates {
    success: bool,
    count: usize,
    updates: Vec<Value>,
}

#[derive(Serialize)]
struct BotInfo {
    success: bool,
    bot: Value,
}

#[derive(Serialize)]
struct Sent {
    success: bool,
    message: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest {
    chat_id: Option<ChatId>,
    #[serde(default)]
    text: String,
}

fn numeric_param<T: std::str::FromStr>(uri: &Uri, name: &str) -> Result<Option<T>> {
    match query_param(uri, name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| GatewayError::BadRequest(format!("{name} must be a number"))),
    }
}

/// `?offset=&limit=&timeout=`
pub async fn updates(bot: &BotClient, request: &Request<Bytes>) -> Result<Response<HandlerBody>> {
    let uri = request.uri();
    let offset = numeric_param::<i64>(uri, "offset")?;
    let limit = numeric_param(uri, "limit")?.unwrap_or(DEFAULT_UPDATE_LIMIT);
    let timeout = numeric_param(uri, "timeout")?.unwrap_or(DEFAULT_UPDATE_TIMEOUT);

    let updates = bot.get_updates(offset, limit, timeout).await?;
    json_response(
        StatusCode::OK,
        &Updates {
            success: true,
            count: updates.len(),
            updates,
        },
    )
}

pub async fn info(bot: &BotClient) -> Result<Response<HandlerBody>> {
    let me = bot.get_me().await?;
    json_response(
        StatusCode::OK,
        &BotInfo {
            success: true,
            bot: me,
        },
    )
}

/// JSON `{chatId, text}`.
pub async fn send(bot: &BotClient, request: &Request<Bytes>) -> Result<Response<HandlerBody>> {
    let send: SendRequest = deserialize_body(request.body())?;
    let chat_id = match send.chat_id {
        Some(chat_id) if !send.text.is_empty() => chat_id,
        _ => {
            return Err(GatewayError::BadRequest(
                "chatId and text are required".to_string(),
            ));
        }
    };

    let message = bot.send_message(&chat_id, &send.text).await?;
    json_response(
        StatusCode::OK,
        &Sent {
            success: true,
            message,
        },
    )
}
