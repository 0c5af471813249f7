//! Types for transport events and session state

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

/// A service record as resolved by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    /// Service instance name (e.g., "Office PC")
    pub name: String,

    /// Advertised host name
    pub host: String,

    /// IP addresses (can be multiple for dual-stack)
    pub addresses: Vec<IpAddr>,

    /// Service port
    pub port: u16,

    /// TXT record properties (key-value metadata)
    pub properties: HashMap<String, String>,
}

impl ResolvedService {
    /// Creates a record with a single address and no properties
    pub fn new(name: impl Into<String>, address: IpAddr, port: u16) -> Self {
        Self {
            name: name.into(),
            host: address.to_string(),
            addresses: vec![address],
            port,
            properties: HashMap::new(),
        }
    }

    /// Returns the primary address (prefer IPv4)
    pub fn primary_address(&self) -> Option<IpAddr> {
        self.addresses
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| self.addresses.first())
            .copied()
    }
}

/// A raw notification delivered by a discovery transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A service matching the filter appeared; it still needs resolving
    Found { name: String },

    /// A service disappeared from the network
    Lost { name: String },

    /// A service was resolved to a concrete address and port
    Resolved(ResolvedService),

    /// Resolving a service failed
    ResolveFailed { name: String, error_code: i32 },
}

impl TransportEvent {
    /// Name of the service the event refers to
    pub fn service_name(&self) -> &str {
        match self {
            TransportEvent::Found { name }
            | TransportEvent::Lost { name }
            | TransportEvent::ResolveFailed { name, .. } => name,
            TransportEvent::Resolved(service) => &service.name,
        }
    }

    /// Short label used for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::Found { .. } => "found",
            TransportEvent::Lost { .. } => "lost",
            TransportEvent::Resolved(_) => "resolved",
            TransportEvent::ResolveFailed { .. } => "resolve_failed",
        }
    }
}

/// Lifecycle of a [`DiscoverySession`](crate::DiscoverySession)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Not subscribed
    Stopped,

    /// Subscription in progress
    Starting,

    /// Subscribed and handling events
    Active,

    /// Unsubscribe in progress
    Stopping,
}

impl SessionState {
    /// Returns a human-readable description
    pub fn description(&self) -> &str {
        match self {
            SessionState::Stopped => "Not discovering",
            SessionState::Starting => "Subscribing to discovery",
            SessionState::Active => "Discovering servers",
            SessionState::Stopping => "Unsubscribing from discovery",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Stopped => write!(f, "Stopped"),
            SessionState::Starting => write!(f, "Starting"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Stopping => write!(f, "Stopping"),
        }
    }
}
