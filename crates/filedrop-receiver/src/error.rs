//! Error types for the receiver service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use filedrop_discovery::DiscoveryError;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::error;

/// Result type alias for receiver operations
pub type Result<T> = std::result::Result<T, ReceiverError>;

/// Errors that stop the receiver from running
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// Configuration rejected before binding
    #[error("Invalid receiver configuration: {0}")]
    InvalidConfig(String),

    /// Listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Upload directory could not be prepared
    #[error("Upload directory {path:?} is unusable: {source}")]
    UploadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// mDNS announcement failed
    #[error(transparent)]
    Announce(#[from] DiscoveryError),

    /// The HTTP server terminated with an error
    #[error("Receiver stopped: {0}")]
    Serve(#[source] std::io::Error),
}

/// Request failure, rendered as `{"status": "error", "message": ...}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Storage(String),
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::Storage(msg) => {
                error!(error = %msg, "Failed to store upload");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to store uploaded file".to_string(),
                )
            }
        };

        let body = Json(ErrorBody {
            status: "error",
            message,
        });
        (status, body).into_response()
    }
}
