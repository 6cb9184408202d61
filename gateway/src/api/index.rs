use super::utils::{HandlerBody, json_response};
use crate::errors::Result;
use crate::router::Route;
use hyper::{Response, StatusCode};
use serde::Serialize;

#[derive(Serialize)]
struct Index {
    name: &'static str,
    version: &'static str,
    routes: Vec<RouteInfo>,
}

#[derive(Serialize)]
struct RouteInfo {
    method: String,
    path: &'static str,
    auth: bool,
}

/// Service name, version and the routes it serves.
pub fn index() -> Result<Response<HandlerBody>> {
    let routes = Route::ALL
        .iter()
        .map(|route| RouteInfo {
            method: route.method().to_string(),
            path: route.path(),
            auth: route.requires_auth(),
        })
        .collect();

    json_response(
        StatusCode::OK,
        &Index {
            name: "courier",
            version: env!("CARGO_PKG_VERSION"),
            routes,
        },
    )
}
