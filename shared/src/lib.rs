pub mod admin_service;
pub mod http;
pub mod metrics_defs;
pub mod secret;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;
