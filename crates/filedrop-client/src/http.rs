//! HTTP transfer client
//!
//! Talks to a receiver over plain HTTP: `GET /status` and a streamed
//! multipart `POST /upload` with a single `file` field.

use async_trait::async_trait;
use filedrop_core::config::TransferConfig;
use filedrop_core::types::{base_url, STATUS_SUCCESS};
use filedrop_core::{StatusResponse, UploadResponse};
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::client::TransferClient;
use crate::error::{Result, TransferError};
use crate::progress::{ProgressCallback, ProgressTracker};

/// Multipart field carrying the file.
pub const UPLOAD_FIELD: &str = "file";

/// reqwest-backed [`TransferClient`].
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransferClient {
    client: Client,
    request_timeout: Duration,
    upload_timeout: Duration,
}

impl HttpTransferClient {
    /// Create a new client from transfer settings
    pub fn new(config: &TransferConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| TransferError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            request_timeout: config.request_timeout(),
            upload_timeout: config.upload_timeout(),
        })
    }

    /// Create a client with default timeouts (30s status probe)
    pub fn with_defaults() -> Result<Self> {
        Self::new(&TransferConfig::default())
    }

    async fn reject_unless_success(addr: SocketAddr, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(%addr, status = status.as_u16(), body = %body, "Receiver returned error status");
        Err(TransferError::HttpStatus {
            addr,
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl TransferClient for HttpTransferClient {
    async fn check_status(&self, addr: SocketAddr) -> Result<StatusResponse> {
        let url = format!("{}status", base_url(addr));

        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| TransferError::from_reqwest(addr, e))?;

        let response = Self::reject_unless_success(addr, response).await?;

        let status: StatusResponse = response
            .json()
            .await
            .map_err(|e| TransferError::from_reqwest(addr, e))?;

        if !status.is_ok() {
            return Err(TransferError::NotReady {
                addr,
                status: status.status,
            });
        }

        debug!(%addr, server_name = %status.server_name, "Receiver is ready");
        Ok(status)
    }

    async fn upload_file(
        &self,
        addr: SocketAddr,
        path: &Path,
        on_progress: ProgressCallback,
    ) -> Result<UploadResponse> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| TransferError::io(path, e))?;
        let total_bytes = file
            .metadata()
            .await
            .map_err(|e| TransferError::io(path, e))?
            .len();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        info!(%addr, file = %file_name, bytes = total_bytes, "Uploading file");

        let (mut tracker, gate) = ProgressTracker::new(total_bytes, on_progress);
        let stream = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                tracker.advance(bytes.len() as u64);
            }
            chunk
        });

        let part = Part::stream_with_length(Body::wrap_stream(stream), total_bytes)
            .file_name(file_name.clone())
            .mime_str("application/octet-stream")
            .map_err(|e| TransferError::from_reqwest(addr, e))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let url = format!("{}upload", base_url(addr));
        let outcome = async {
            let response = self
                .client
                .post(&url)
                .timeout(self.upload_timeout)
                .multipart(form)
                .send()
                .await
                .map_err(|e| TransferError::from_reqwest(addr, e))?;

            let response = Self::reject_unless_success(addr, response).await?;

            let upload: UploadResponse = response
                .json()
                .await
                .map_err(|e| TransferError::from_reqwest(addr, e))?;

            if upload.status != STATUS_SUCCESS {
                return Err(TransferError::Rejected {
                    message: upload.message,
                });
            }
            Ok(upload)
        }
        .await;

        gate.close();

        match &outcome {
            Ok(upload) => {
                metrics::counter!("filedrop_uploads_total", "outcome" => "success").increment(1);
                info!(%addr, file = %file_name, stored_at = %upload.file.path, "Upload complete");
            }
            Err(e) => {
                metrics::counter!("filedrop_uploads_total", "outcome" => "failure").increment(1);
                warn!(%addr, file = %file_name, error = %e, "Upload failed");
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::no_progress;
    use std::net::{Ipv4Addr, TcpListener};

    /// An address nothing listens on.
    fn closed_port() -> SocketAddr {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn test_client_creation() {
        assert!(HttpTransferClient::with_defaults().is_ok());
    }

    #[tokio::test]
    async fn test_status_against_closed_port_is_unreachable() {
        let client = HttpTransferClient::with_defaults().unwrap();
        let err = client.check_status(closed_port()).await.unwrap_err();
        assert!(err.is_unreachable(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_io_error() {
        let client = HttpTransferClient::with_defaults().unwrap();
        let err = client
            .upload_file(closed_port(), Path::new("/no/such/file.bin"), no_progress())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Io { .. }));
    }
}
