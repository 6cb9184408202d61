pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod router;
pub mod service;
pub mod upstreams;

use crate::config::Config;
use crate::errors::GatewayError;
use crate::service::{Backends, GatewayService};
use shared::admin_service::AdminService;
use shared::http::run_http_service;

pub async fn run(config: Config) -> Result<(), GatewayError> {
    tracing::info!("Starting courier gateway");

    if config.api_key.is_none() {
        tracing::warn!("No api_key configured, every route is open");
    }
    for (section, configured) in [
        ("content_store", config.content_store.is_some()),
        ("media", config.media.is_some()),
        ("messaging", config.messaging.is_some()),
    ] {
        if !configured {
            tracing::warn!(section, "Section not configured, its routes will answer 503");
        }
    }

    let backends = Backends::from_config(&config)?;
    let gateway_service =
        GatewayService::new(backends, config.api_key.clone(), config.max_body_bytes);
    let admin_service = AdminService::new(|| true);

    let gateway_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        gateway_service,
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(gateway_task, admin_task)?;
    Ok(())
}
