//! Optimistic-concurrency writes into a remote, path-addressed content store.
//!
//! [`client::ContentsClient`] speaks the store's HTTPS contents API,
//! [`writer::ConflictAwareWriter`] runs the create-or-update protocol with
//! bounded retries on version conflicts, and [`batch::BatchUploader`] applies
//! it to several files one at a time.

pub mod batch;
pub mod client;
pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod naming;
mod protocol;
pub mod types;
pub mod writer;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

pub use batch::{BatchError, BatchUploader};
pub use client::{ContentsClient, FileStore};
pub use config::StoreConfig;
pub use errors::{Result, StoreError};
pub use types::{FileUpload, RemoteFile, WriteReceipt, WriteRequest};
pub use writer::{ConflictAwareWriter, RetryPolicy};
