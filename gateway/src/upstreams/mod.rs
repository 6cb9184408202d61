//! Clients of the third-party services the gateway passes requests through to.

pub mod media;
pub mod messaging;

use std::time::Duration;

fn http_client(timeout_secs: u64) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("courier/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}
