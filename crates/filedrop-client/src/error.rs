//! Error types for the transfer client

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;

/// Errors returned by status probes and uploads.
///
/// The `Display` output is the reason string surfaced to the caller.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The HTTP client could not be constructed
    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(String),

    /// The request did not complete within its timeout
    #[error("Request to {addr} timed out")]
    Timeout { addr: SocketAddr },

    /// The receiver could not be reached
    #[error("Failed to connect to {addr}: {reason}")]
    Connection { addr: SocketAddr, reason: String },

    /// The receiver answered with a non-success HTTP status
    #[error("Server returned error: {status}")]
    HttpStatus { addr: SocketAddr, status: u16 },

    /// The receiver answered `/status` with something other than "ok"
    #[error("Server at {addr} is not ready (status '{status}')")]
    NotReady { addr: SocketAddr, status: String },

    /// The receiver did not confirm the upload
    #[error("Upload failed: {message}")]
    Rejected { message: String },

    /// The response body could not be decoded
    #[error("Invalid response from {addr}: {reason}")]
    InvalidResponse { addr: SocketAddr, reason: String },

    /// Local file I/O failed
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other request failure
    #[error("Request to {addr} failed: {reason}")]
    Request { addr: SocketAddr, reason: String },
}

impl TransferError {
    /// Classifies a reqwest error raised while talking to `addr`.
    pub(crate) fn from_reqwest(addr: SocketAddr, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransferError::Timeout { addr }
        } else if err.is_connect() {
            TransferError::Connection {
                addr,
                reason: err.to_string(),
            }
        } else if err.is_decode() {
            TransferError::InvalidResponse {
                addr,
                reason: err.to_string(),
            }
        } else {
            TransferError::Request {
                addr,
                reason: err.to_string(),
            }
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransferError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for failures where the receiver never answered.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            TransferError::Timeout { .. } | TransferError::Connection { .. }
        )
    }
}
