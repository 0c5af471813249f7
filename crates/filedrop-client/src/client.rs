use async_trait::async_trait;
use filedrop_core::{StatusResponse, UploadResponse};
use std::net::SocketAddr;
use std::path::Path;

use crate::error::Result;
use crate::progress::ProgressCallback;

/// Async interface to a file receiver.
///
/// Implementations own whatever connection state they need; callers hold an
/// explicit client value rather than looking one up per server.
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Check whether the receiver at `addr` accepts uploads.
    ///
    /// Succeeds only for a 2xx response whose body reports `status == "ok"`.
    /// Bounded by the client's request timeout.
    async fn check_status(&self, addr: SocketAddr) -> Result<StatusResponse>;

    /// Upload the file at `path` to the receiver at `addr`.
    ///
    /// `on_progress` is called zero or more times with non-decreasing
    /// percentages, all before this method returns its single outcome.
    async fn upload_file(
        &self,
        addr: SocketAddr,
        path: &Path,
        on_progress: ProgressCallback,
    ) -> Result<UploadResponse>;
}
