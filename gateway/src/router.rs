use hyper::Method;

/// Every endpoint the gateway serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Index,
    VerifyAccess,
    UploadFile,
    UploadFiles,
    UploadJson,
    DeleteFile,
    ListFiles,
    MediaUpload,
    MediaUploadMultiple,
    BotUpdates,
    BotInfo,
    BotSend,
}

impl Route {
    pub const ALL: [Route; 12] = [
        Route::Index,
        Route::VerifyAccess,
        Route::UploadFile,
        Route::UploadFiles,
        Route::UploadJson,
        Route::DeleteFile,
        Route::ListFiles,
        Route::MediaUpload,
        Route::MediaUploadMultiple,
        Route::BotUpdates,
        Route::BotInfo,
        Route::BotSend,
    ];

    pub fn method(&self) -> Method {
        match self {
            Route::Index
            | Route::VerifyAccess
            | Route::ListFiles
            | Route::BotUpdates
            | Route::BotInfo => Method::GET,
            Route::DeleteFile => Method::DELETE,
            Route::UploadFile
            | Route::UploadFiles
            | Route::UploadJson
            | Route::MediaUpload
            | Route::MediaUploadMultiple
            | Route::BotSend => Method::POST,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Route::Index => "/",
            Route::VerifyAccess => "/github/verify",
            Route::UploadFile => "/github/upload",
            Route::UploadFiles => "/github/upload-multiple",
            Route::UploadJson => "/github/upload-json",
            Route::DeleteFile => "/github/delete",
            Route::ListFiles => "/github/list",
            Route::MediaUpload => "/upload",
            Route::MediaUploadMultiple => "/upload-multiple",
            Route::BotUpdates => "/telegram/updates",
            Route::BotInfo => "/telegram/me",
            Route::BotSend => "/telegram/send",
        }
    }

    /// Label used in metrics and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Route::Index => "index",
            Route::VerifyAccess => "verify_access",
            Route::UploadFile => "upload_file",
            Route::UploadFiles => "upload_files",
            Route::UploadJson => "upload_json",
            Route::DeleteFile => "delete_file",
            Route::ListFiles => "list_files",
            Route::MediaUpload => "media_upload",
            Route::MediaUploadMultiple => "media_upload_multiple",
            Route::BotUpdates => "bot_updates",
            Route::BotInfo => "bot_info",
            Route::BotSend => "bot_send",
        }
    }

    /// The `error` field of a failed response on this route.
    pub fn failure_summary(&self) -> &'static str {
        match self {
            Route::Index => "Internal error",
            Route::VerifyAccess => "Verification failed",
            Route::UploadFile | Route::UploadJson | Route::MediaUpload => "Upload failed",
            Route::UploadFiles | Route::MediaUploadMultiple => "Multiple upload failed",
            Route::DeleteFile => "Delete failed",
            Route::ListFiles => "Failed to list files",
            Route::BotUpdates => "Failed to get updates",
            Route::BotInfo => "Failed to get bot info",
            Route::BotSend => "Failed to send message",
        }
    }

    /// The index stays public so clients can discover the API.
    pub fn requires_auth(&self) -> bool {
        *self != Route::Index
    }
}

/// Finds the route serving `method` on `path`. Paths match exactly, apart from
/// a single trailing slash.
pub fn find_matching_route(method: &Method, path: &str) -> Option<Route> {
    let path = match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    };
    Route::ALL
        .into_iter()
        .find(|route| route.method() == *method && route.path() == path)
}
