//! Several files, one after another, through the same writer.

use crate::errors::StoreError;
use crate::naming::unique_path_under;
use crate::types::{FileUpload, WriteReceipt};
use crate::writer::ConflictAwareWriter;
use thiserror::Error;

/// The first file of a batch that could not be written.
///
/// Files before it stay committed; nothing is rolled back.
#[derive(Error, Debug)]
#[error("file {} of {total} ({name}) failed: {source}", .index + 1)]
pub struct BatchError {
    pub index: usize,
    pub name: String,
    pub total: usize,
    pub committed: Vec<WriteReceipt>,
    #[source]
    pub source: StoreError,
}

pub struct BatchUploader {
    writer: ConflictAwareWriter,
}

impl BatchUploader {
    pub fn new(writer: ConflictAwareWriter) -> Self {
        Self { writer }
    }

    /// Writes `files` in order under `base_path`, each with a unique name.
    /// Stops at the first failure.
    pub async fn upload_all(
        &self,
        files: &[FileUpload],
        base_path: &str,
        message: Option<&str>,
        branch: &str,
    ) -> Result<Vec<WriteReceipt>, BatchError> {
        let total = files.len();
        let mut committed = Vec::with_capacity(total);

        for (index, file) in files.iter().enumerate() {
            let path = unique_path_under(base_path, &file.name);
            match self.writer.upload(file, &path, message, branch).await {
                Ok(receipt) => committed.push(receipt),
                Err(source) => {
                    tracing::warn!(
                        index,
                        total,
                        name = %file.name,
                        committed = committed.len(),
                        error = %source,
                        "Batch upload stopped"
                    );
                    return Err(BatchError {
                        index,
                        name: file.name.clone(),
                        total,
                        committed,
                        source,
                    });
                }
            }
        }

        tracing::info!(total, base_path, "Batch upload committed");
        Ok(committed)
    }
}
