//! Upload storage
//!
//! Each upload is written to `<upload_dir>/<unix millis>-<original name>`,
//! or `<unix millis>-<n>-<original name>` when that file already exists. A write that would exceed the size limit, or any I/O failure, removes the
//! partial file.

use filedrop_core::FileInfo;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::ApiError;

/// Name used when the client sent none
const UNNAMED_UPLOAD: &str = "upload.bin";

/// Attempts at a free file name before giving up
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Directory that uploads are stored in
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: u64,
}

impl UploadStore {
    /// Creates a store writing into `dir`, accepting files up to `max_bytes`
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    /// Creates the upload directory if needed
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Upload directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Size limit per file
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Opens a new destination file for `original_name`.
    ///
    /// Never reuses an existing file, so concurrent uploads of the same name
    /// land in distinct files.
    pub async fn create(&self, original_name: &str) -> Result<PendingUpload, ApiError> {
        let original_name = display_name(original_name);
        let stored = stored_name(&original_name);
        let millis = chrono::Utc::now().timestamp_millis();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let file_name = if attempt == 0 {
                format!("{}-{}", millis, stored)
            } else {
                format!("{}-{}-{}", millis, attempt, stored)
            };
            let path = self.dir.join(file_name);

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    debug!(path = %path.display(), "Receiving upload");
                    return Ok(PendingUpload {
                        file: Some(file),
                        path,
                        original_name,
                        written: 0,
                        max_bytes: self.max_bytes,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(ApiError::Storage(format!("{}: {}", path.display(), e)));
                }
            }
        }

        Err(ApiError::Storage(format!(
            "no free file name for {:?} in {}",
            stored,
            self.dir.display()
        )))
    }
}

/// A file being received.
///
/// Dropped without [`finish`](Self::finish), the partial file is deleted.
#[derive(Debug)]
pub struct PendingUpload {
    file: Option<File>,
    path: PathBuf,
    original_name: String,
    written: u64,
    max_bytes: u64,
}

impl PendingUpload {
    /// Appends a chunk of the file body.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), ApiError> {
        let Some(file) = self.file.as_mut() else {
            return Err(ApiError::Storage("upload already finished".to_string()));
        };

        let written = self.written + chunk.len() as u64;
        if written > self.max_bytes {
            return Err(ApiError::PayloadTooLarge(format!(
                "File too large (limit {} bytes)",
                self.max_bytes
            )));
        }

        file.write_all(chunk)
            .await
            .map_err(|e| ApiError::Storage(format!("{}: {}", self.path.display(), e)))?;
        self.written = written;
        Ok(())
    }

    /// Flushes the file and returns its description.
    pub async fn finish(mut self) -> Result<FileInfo, ApiError> {
        let Some(mut file) = self.file.take() else {
            return Err(ApiError::Storage("upload already finished".to_string()));
        };

        if let Err(e) = file.flush().await {
            let reason = format!("{}: {}", self.path.display(), e);
            remove_partial(&self.path);
            return Err(ApiError::Storage(reason));
        }

        Ok(FileInfo {
            original_name: std::mem::take(&mut self.original_name),
            size: self.written,
            path: self.path.display().to_string(),
        })
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            remove_partial(&self.path);
        }
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Failed to remove partial upload");
    }
}

/// Name reported back to the client
fn display_name(original_name: &str) -> String {
    let trimmed = original_name.trim();
    if trimmed.is_empty() {
        UNNAMED_UPLOAD.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Single path component safe to join onto the upload directory
fn stored_name(original_name: &str) -> String {
    let name: String = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();

    match name.as_str() {
        "" | "." | ".." => UNNAMED_UPLOAD.to_string(),
        _ => name,
    }
}
