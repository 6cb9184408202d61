use crate::api;
use crate::api::files::FilesBackend;
use crate::api::utils::{HandlerBody, make_error_response};
use crate::auth;
use crate::config::Config;
use crate::errors::{GatewayError, Result};
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS_INFLIGHT, REQUESTS_UNAUTHORIZED};
use crate::router::{Route, find_matching_route};
use crate::upstreams::media::MediaClient;
use crate::upstreams::messaging::BotClient;
use content_store::{ContentsClient, FileStore, RetryPolicy};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::CONTENT_LENGTH;
use hyper::service::Service;
use hyper::{HeaderMap, Request, Response};
use metrics::Gauge;
use shared::secret::Secret;
use shared::{counter, gauge, histogram};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Upstream clients, each present only when its section is configured.
#[derive(Default)]
pub struct Backends {
    pub files: Option<FilesBackend>,
    pub media: Option<MediaClient>,
    pub messaging: Option<BotClient>,
}

impl Backends {
    pub fn from_config(config: &Config) -> Result<Self> {
        let files = match &config.content_store {
            Some(store_config) => {
                let store: Arc<dyn FileStore> = Arc::new(ContentsClient::new(store_config)?);
                Some(FilesBackend::new(
                    store,
                    RetryPolicy::from(&store_config.retry),
                    store_config.default_branch.clone(),
                ))
            }
            None => None,
        };
        let media = config.media.as_ref().map(MediaClient::new).transpose()?;
        let messaging = config.messaging.as_ref().map(BotClient::new).transpose()?;

        Ok(Backends {
            files,
            media,
            messaging,
        })
    }

    fn files(&self) -> Result<&FilesBackend> {
        self.files
            .as_ref()
            .ok_or(GatewayError::NotConfigured("content_store"))
    }

    fn media(&self) -> Result<&MediaClient> {
        self.media.as_ref().ok_or(GatewayError::NotConfigured("media"))
    }

    fn messaging(&self) -> Result<&BotClient> {
        self.messaging
            .as_ref()
            .ok_or(GatewayError::NotConfigured("messaging"))
    }
}

struct Inner {
    backends: Backends,
    api_key: Option<Secret>,
    max_body_bytes: usize,
}

#[derive(Clone)]
pub struct GatewayService {
    inner: Arc<Inner>,
}

impl GatewayService {
    pub fn new(backends: Backends, api_key: Option<Secret>, max_body_bytes: usize) -> Self {
        GatewayService {
            inner: Arc::new(Inner {
                backends,
                api_key,
                max_body_bytes,
            }),
        }
    }

    /// Routes, authenticates and answers one request. Every failure becomes a
    /// JSON error response.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<HandlerBody>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let Some(route) = find_matching_route(&method, &path) else {
            tracing::warn!(method = %method, path = %path, "No route matched");
            let error = GatewayError::NoRouteMatched {
                method: method.to_string(),
                path,
            };
            let response = make_error_response(&error, error.summary("Not found"));
            record_duration(UNMATCHED_ROUTE, &response, start);
            return response;
        };

        let inflight = InflightGuard::enter();
        let result = self.dispatch(route, request).await;
        drop(inflight);

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                let status = error.status_code();
                if status.is_server_error() {
                    tracing::error!(route = route.name(), status = status.as_u16(), error = %error, "Request failed");
                } else {
                    tracing::info!(route = route.name(), status = status.as_u16(), error = %error, "Request rejected");
                }
                make_error_response(&error, error.summary(route.failure_summary()))
            }
        };

        record_duration(route.name(), &response, start);
        response
    }

    async fn dispatch<B>(&self, route: Route, request: Request<B>) -> Result<Response<HandlerBody>>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let inner = &self.inner;
        if route.requires_auth()
            && !auth::is_authorized(
                inner.api_key.as_ref(),
                request.headers(),
                request.uri().query(),
            )
        {
            counter!(REQUESTS_UNAUTHORIZED, "route" => route.name()).increment(1);
            return Err(GatewayError::Unauthorized);
        }

        let (parts, body) = request.into_parts();
        let body = read_body(&parts.headers, body, inner.max_body_bytes).await?;
        let request = Request::from_parts(parts, body);
        tracing::debug!(route = route.name(), bytes = request.body().len(), "Matched route");

        let backends = &inner.backends;
        match route {
            Route::Index => api::index::index(),
            Route::VerifyAccess => api::files::verify_access(backends.files()?).await,
            Route::UploadFile => api::files::upload_file(backends.files()?, &request).await,
            Route::UploadFiles => api::files::upload_files(backends.files()?, &request).await,
            Route::UploadJson => api::files::upload_json(backends.files()?, &request).await,
            Route::DeleteFile => api::files::delete_file(backends.files()?, &request).await,
            Route::ListFiles => api::files::list_files(backends.files()?, &request).await,
            Route::MediaUpload => api::media::upload(backends.media()?, &request).await,
            Route::MediaUploadMultiple => {
                api::media::upload_multiple(backends.media()?, &request).await
            }
            Route::BotUpdates => api::messaging::updates(backends.messaging()?, &request).await,
            Route::BotInfo => api::messaging::info(backends.messaging()?).await,
            Route::BotSend => api::messaging::send(backends.messaging()?, &request).await,
        }
    }
}

const UNMATCHED_ROUTE: &str = "unmatched";

/// Holds one `requests.inflight` slot until dropped, including when a
/// handler unwinds.
struct InflightGuard(Gauge);

impl InflightGuard {
    fn enter() -> Self {
        let gauge = gauge!(REQUESTS_INFLIGHT);
        gauge.increment(1.0);
        InflightGuard(gauge)
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.decrement(1.0);
    }
}

fn record_duration(route: &'static str, response: &Response<HandlerBody>, start: Instant) {
    histogram!(
        REQUEST_DURATION,
        "route" => route,
        "status" => response.status().as_u16().to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Buffers the body, refusing anything over `limit` bytes.
async fn read_body<B>(headers: &HeaderMap, body: B, limit: usize) -> Result<Bytes>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.is_some_and(|length| length > limit) {
        return Err(GatewayError::PayloadTooLarge { limit });
    }

    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(GatewayError::PayloadTooLarge { limit })
        }
        Err(e) => Err(GatewayError::RequestBody(e.to_string())),
    }
}

impl Service<Request<Incoming>> for GatewayService {
    type Response = Response<HandlerBody>;
    type Error = GatewayError;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, request: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move {
            // Detached so a client hanging up cannot abandon a write midway;
            // the retry loop always reaches a terminal state.
            let handled = tokio::spawn(async move { service.handle(request).await });
            match handled.await {
                Ok(response) => Ok(response),
                Err(e) => {
                    tracing::error!(error = %e, "Request handler panicked");
                    let error = GatewayError::Internal(e.to_string());
                    Ok(make_error_response(&error, "Internal error"))
                }
            }
        })
    }
}
