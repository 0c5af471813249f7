//! # Filedrop Core
//!
//! Core types, error handling, and configuration shared by the Filedrop crates.
//!
//! This crate provides the foundational building blocks for the Filedrop system:
//!
//! - **Types**: the [`Server`] entity published by discovery, and the JSON
//!   payloads exchanged with a receiver (`/status`, `/upload`).
//! - **Errors**: configuration errors using `thiserror`.
//! - **Configuration**: YAML files, environment variable overrides, and
//!   validation for discovery, transfer, receiver and logging settings.
//!
//! ## Example
//!
//! ```
//! use filedrop_core::Server;
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! let server = Server::discovered("office-pc", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), 8000);
//!
//! assert!(server.is_available);
//! assert_eq!(server.base_url(), "http://10.0.0.5:8000/");
//! ```

pub mod config;
pub mod discovery_config;
pub mod error;
pub mod types;

// Re-export commonly used types for convenience
pub use config::AppConfig;
pub use discovery_config::DiscoveryConfig;
pub use error::{ConfigError, Result};
pub use types::{FileInfo, Server, StatusResponse, UploadResponse};
