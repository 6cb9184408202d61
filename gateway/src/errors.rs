use crate::upstreams::media::MediaError;
use crate::upstreams::messaging::MessagingError;
use content_store::{BatchError, StoreError};
use hyper::StatusCode;
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Errors that can occur while serving a gateway request
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),

    #[error(
        "Invalid or missing API key. Provide it via x-api-key header, Authorization header, or api_key query parameter."
    )]
    Unauthorized,

    #[error("No route matched {method} {path}")]
    NoRouteMatched { method: String, path: String },

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Failed to read request body: {0}")]
    RequestBody(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("Response serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::NoRouteMatched { .. } => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::RequestBody(_) => StatusCode::BAD_REQUEST,
            GatewayError::Store(e) => store_status(e),
            GatewayError::Batch(e) => store_status(&e.source),
            GatewayError::Media(MediaError::UnsupportedType { .. }) => StatusCode::BAD_REQUEST,
            GatewayError::Media(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Messaging(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Serialization(_) | GatewayError::Internal(_) | GatewayError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short summary for the `error` field of the response. Errors that are
    /// not specific to an operation name themselves; the rest use `operation`.
    pub fn summary(&self, operation: &'static str) -> &'static str {
        match self {
            GatewayError::Unauthorized => "Unauthorized",
            GatewayError::NoRouteMatched { .. } => "Not found",
            GatewayError::PayloadTooLarge { .. } => "Payload too large",
            GatewayError::NotConfigured(_) => "Not configured",
            _ => operation,
        }
    }
}

fn store_status(error: &StoreError) -> StatusCode {
    match error {
        StoreError::Validation(_) => StatusCode::BAD_REQUEST,
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::NotAFile { .. } => StatusCode::BAD_REQUEST,
        StoreError::VersionConflict { .. } | StoreError::RetryExhausted { .. } => {
            StatusCode::CONFLICT
        }
        StoreError::Upstream { .. } | StoreError::Http(_) => StatusCode::BAD_GATEWAY,
        StoreError::InvalidBaseUrl(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
