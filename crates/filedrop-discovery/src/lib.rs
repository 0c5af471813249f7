//! Discovery of file receivers on the local network
//!
//! This crate keeps an observable list of receivers and their availability:
//! - Browse for receivers advertising an `_http._tcp` service over mDNS
//! - Resolve and deduplicate them by service name
//! - Probe each resolved receiver's status endpoint in the background
//! - Publish every change as a consistent, id-ordered snapshot
//! - Announce a local receiver so other machines can find it
//!
//! # Architecture
//!
//! A [`DiscoverySession`] subscribes to a [`DiscoveryTransport`] and drains
//! its events in one task, applying them to a [`ServerRegistry`]. After each
//! resolution an [`AvailabilityProber`] checks the receiver and writes the
//! outcome back. The registry is the single point of synchronization; its
//! snapshots are published through a `tokio::sync::watch` channel.
//!
//! # Example
//!
//! ```no_run
//! use filedrop_client::HttpTransferClient;
//! use filedrop_discovery::{DiscoveryConfig, DiscoverySession, MdnsTransport};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(MdnsTransport::new()?);
//!     let client = Arc::new(HttpTransferClient::with_defaults()?);
//!     let session = DiscoverySession::new(DiscoveryConfig::default(), transport, client);
//!
//!     session.start()?;
//!
//!     let mut servers = session.servers();
//!     while servers.changed().await.is_ok() {
//!         for server in servers.borrow_and_update().iter() {
//!             println!("{} available={}", server, server.is_available);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mdns;
pub mod prober;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;

pub use config::{DiscoveryConfig, HTTP_SERVICE_TYPE};
pub use error::{DiscoveryError, Result};
pub use mdns::{default_instance_name, MdnsTransport, ServiceAnnouncer};
pub use prober::AvailabilityProber;
pub use registry::{Generation, ServerRegistry};
pub use session::DiscoverySession;
pub use transport::{ChannelTransport, DiscoveryTransport};
pub use types::{ResolvedService, SessionState, TransportEvent};
