//! Staged uploads
//!
//! Sources that are not plain files (stdin, content handed over by a host
//! application) are copied into a private scratch directory first and then
//! uploaded like any file. The scratch directory is removed whether the
//! upload succeeds or fails.

use filedrop_core::UploadResponse;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, warn};

use crate::client::TransferClient;
use crate::error::{Result, TransferError};
use crate::progress::ProgressCallback;

/// Copy `reader` to a temporary file named `file_name` and upload it.
///
/// The temporary copy never outlives this call.
pub async fn upload_reader<C, R>(
    client: &C,
    addr: SocketAddr,
    file_name: &str,
    mut reader: R,
    on_progress: ProgressCallback,
) -> Result<UploadResponse>
where
    C: TransferClient + ?Sized,
    R: AsyncRead + Unpin,
{
    let scratch = tempfile::Builder::new()
        .prefix("filedrop-")
        .tempdir()
        .map_err(|e| TransferError::io(std::env::temp_dir(), e))?;
    let staged = scratch.path().join(staged_file_name(file_name));

    let copied = stage(&mut reader, &staged).await;
    let outcome = match copied {
        Ok(bytes) => {
            debug!(path = %staged.display(), bytes, "Staged upload source");
            client.upload_file(addr, &staged, on_progress).await
        }
        Err(e) => Err(e),
    };

    let scratch_path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        warn!(path = %scratch_path.display(), error = %e, "Failed to remove staged upload");
    }

    outcome
}

async fn stage<R>(reader: &mut R, path: &Path) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| TransferError::io(path, e))?;
    let bytes = tokio::io::copy(reader, &mut file)
        .await
        .map_err(|e| TransferError::io(path, e))?;
    file.flush().await.map_err(|e| TransferError::io(path, e))?;
    Ok(bytes)
}

/// Reduces a caller-supplied name to a single safe path component.
fn staged_file_name(file_name: &str) -> PathBuf {
    Path::new(file_name)
        .file_name()
        .filter(|name| !name.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("upload.bin"))
}
