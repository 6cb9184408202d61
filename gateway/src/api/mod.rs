pub mod files;
pub mod index;
pub mod media;
pub mod messaging;
pub mod utils;

use serde::Serialize;

/// `{"success": true, "message"?: …, "data"?: …}`
#[derive(Debug, Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T> Success<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Success {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn data(data: T) -> Self {
        Success {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Success {
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }
}
