//! Core types for Filedrop.
//!
//! This module defines the server entity tracked by discovery and the
//! payloads a receiver exchanges with clients over HTTP.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Status value a receiver reports when it accepts uploads.
pub const STATUS_OK: &str = "ok";

/// Status value of a successful upload response.
pub const STATUS_SUCCESS: &str = "success";

/// A file-receiving endpoint found on the local network.
///
/// `id` is the identity of the entry: it comes from the advertised service
/// name and drives both deduplication and list diffing. `address` and `port`
/// are attributes of that id and may change when the service is resolved
/// again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    /// Stable identity (the advertised service name)
    pub id: String,

    /// Human-readable label
    pub name: String,

    /// Resolved IP address
    pub address: IpAddr,

    /// Resolved TCP port
    pub port: u16,

    /// Last known reachability of the HTTP endpoint
    pub is_available: bool,

    /// UI-local selection flag, carried through untouched
    #[serde(default)]
    pub is_selected: bool,
}

impl Server {
    /// Creates a freshly resolved server.
    ///
    /// The name doubles as the id, and the server starts out available
    /// until a status probe says otherwise.
    pub fn discovered(name: impl Into<String>, address: IpAddr, port: u16) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            address,
            port,
            is_available: true,
            is_selected: false,
        }
    }

    /// Returns the socket address of the endpoint.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Returns the HTTP base URL (`http://{address}:{port}/`).
    pub fn base_url(&self) -> String {
        base_url(self.socket_addr())
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.socket_addr())
    }
}

/// Builds the HTTP base URL for a receiver address.
///
/// IPv6 addresses are bracketed by the `SocketAddr` formatting.
pub fn base_url(addr: SocketAddr) -> String {
    format!("http://{}/", addr)
}

/// Response body of `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// `"ok"` when the receiver accepts uploads
    pub status: String,

    /// Host name of the receiver
    pub server_name: String,

    /// ISO 8601 timestamp of the response
    pub timestamp: String,
}

impl StatusResponse {
    /// Returns true if the receiver reported itself ready.
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Response body of a successful `POST /upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// `"success"` on a stored upload
    pub status: String,

    /// Human-readable outcome
    pub message: String,

    /// Details of the stored file
    pub file: FileInfo,
}

/// Stored file details reported by the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// File name as sent by the client
    pub original_name: String,

    /// Number of bytes stored
    pub size: u64,

    /// Location of the stored file on the receiver
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_discovered_server_defaults() {
        let server = Server::discovered("svc1", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), 8000);

        assert_eq!(server.id, "svc1");
        assert_eq!(server.name, "svc1");
        assert!(server.is_available);
        assert!(!server.is_selected);
    }

    #[test]
    fn test_base_url_brackets_ipv6() {
        let server = Server::discovered("v6", IpAddr::V6(Ipv6Addr::LOCALHOST), 8000);
        assert_eq!(server.base_url(), "http://[::1]:8000/");
    }

    #[test]
    fn test_status_response_wire_format() {
        let json = r#"{"status":"ok","serverName":"desk","timestamp":"2024-01-01T00:00:00.000Z"}"#;
        let status: StatusResponse = serde_json::from_str(json).unwrap();

        assert!(status.is_ok());
        assert_eq!(status.server_name, "desk");

        let busy = StatusResponse {
            status: "busy".to_string(),
            ..status
        };
        assert!(!busy.is_ok());
    }

    #[test]
    fn test_upload_response_wire_format() {
        let json = r#"{
            "status": "success",
            "message": "File uploaded successfully",
            "file": {"originalName": "a.bin", "size": 10485760, "path": "uploads/1-a.bin"}
        }"#;
        let response: UploadResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.status, STATUS_SUCCESS);
        assert_eq!(response.file.size, 10_485_760);
        assert_eq!(response.file.original_name, "a.bin");
    }
}
