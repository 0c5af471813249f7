//! Error types for the discovery subsystem

use thiserror::Error;

/// Result type alias for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Errors that can occur during service discovery.
///
/// Only subscription-level errors ever reach the caller of
/// [`DiscoverySession`](crate::DiscoverySession); per-service failures are
/// logged and contained.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// mDNS service daemon failed to initialize
    #[error("Failed to initialize mDNS daemon: {0}")]
    MdnsInitFailed(String),

    /// The transport refused to start browsing
    #[error("Failed to browse for service type '{service_type}': {reason}")]
    SubscribeFailed { service_type: String, reason: String },

    /// The transport failed to stop browsing
    #[error("Failed to stop browsing for service type '{service_type}': {reason}")]
    UnsubscribeFailed { service_type: String, reason: String },

    /// Failed to register/announce a service
    #[error("Failed to register service '{service_name}': {reason}")]
    RegisterFailed {
        service_name: String,
        reason: String,
    },

    /// Service resolution failed or produced an unusable record
    #[error("Failed to resolve service '{service_name}': {reason}")]
    ResolutionFailed {
        service_name: String,
        reason: String,
    },

    /// Invalid service configuration
    #[error("Invalid service configuration: {0}")]
    InvalidConfig(String),
}

impl DiscoveryError {
    pub(crate) fn resolution(service_name: &str, reason: impl Into<String>) -> Self {
        DiscoveryError::ResolutionFailed {
            service_name: service_name.to_string(),
            reason: reason.into(),
        }
    }
}
