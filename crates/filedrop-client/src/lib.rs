//! # filedrop-client
//!
//! Async client for file receivers on the local network.
//!
//! A receiver exposes two operations over plain HTTP:
//!
//! - **Status**: `GET /status`, answered with `{"status": "ok", ...}` when the
//!   receiver accepts uploads
//! - **Upload**: `POST /upload`, a multipart body with a single `file` field
//!
//! ## Features
//!
//! - [`TransferClient`] trait so discovery can probe through any implementation
//! - Streamed uploads with monotonic progress callbacks
//! - Staged uploads from arbitrary readers, with guaranteed scratch cleanup
//! - Typed errors whose display text is the user-facing failure reason
//!
//! ## Example
//!
//! ```rust,no_run
//! use filedrop_client::{no_progress, HttpTransferClient, TransferClient};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpTransferClient::with_defaults()?;
//!     let addr = "192.168.1.20:8000".parse()?;
//!
//!     client.check_status(addr).await?;
//!     let response = client.upload_file(addr, Path::new("photo.jpg"), no_progress()).await?;
//!     println!("stored at {}", response.file.path);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod http;
pub mod progress;
pub mod staging;

// Re-export commonly used types
pub use client::TransferClient;
pub use error::{Result, TransferError};
pub use http::HttpTransferClient;
pub use progress::{no_progress, ProgressCallback, UploadProgress};
pub use staging::upload_reader;
