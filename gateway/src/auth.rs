//! Shared-secret API key check.

use hyper::header::{AUTHORIZATION, HeaderMap};
use shared::secret::Secret;

const API_KEY_HEADER: &str = "x-api-key";
const API_KEY_QUERY_PARAM: &str = "api_key";

/// The key a client presented, looked up in the `x-api-key` header, then a
/// bearer `Authorization` header, then the `api_key` query parameter.
pub fn presented_key(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    let from_header = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty());
    if let Some(key) = from_header {
        return Some(key.to_string());
    }

    let from_bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            let (scheme, credentials) = value.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then_some(credentials)
        })
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(key) = from_bearer {
        return Some(key.to_string());
    }

    query.and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(name, _)| name == API_KEY_QUERY_PARAM)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    })
}

/// With no key configured every request is allowed.
pub fn is_authorized(expected: Option<&Secret>, headers: &HeaderMap, query: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => {
            presented_key(headers, query).is_some_and(|key| key == expected.expose())
        }
    }
}
