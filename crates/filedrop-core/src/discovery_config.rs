//! Configuration types for service discovery

use serde::{Deserialize, Serialize};

/// Service type browsed for and announced by default.
pub const HTTP_SERVICE_TYPE: &str = "_http._tcp.local.";

/// Configuration for the discovery session and mDNS announcement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Enable automatic service discovery
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Service type filter (DNS-SD form, e.g. "_http._tcp.local.")
    #[serde(default = "default_service_type")]
    pub service_type: String,

    /// Probe each server's status endpoint after it resolves
    #[serde(default = "default_probe_on_resolve")]
    pub probe_on_resolve: bool,

    /// Capacity of the transport event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Instance name announced by a receiver (host name if not set)
    #[serde(default)]
    pub instance_name: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            service_type: default_service_type(),
            probe_on_resolve: default_probe_on_resolve(),
            event_channel_capacity: default_event_channel_capacity(),
            instance_name: None,
        }
    }
}

impl DiscoveryConfig {
    /// Returns the service type in fully-qualified mDNS form.
    ///
    /// Accepts the short platform spelling (`_http._tcp.`) as well.
    pub fn qualified_service_type(&self) -> String {
        qualify_service_type(&self.service_type)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), String> {
        let service_type = self.service_type.trim_end_matches('.');
        if !service_type.starts_with('_') || !service_type.contains("._") {
            return Err(format!(
                "service_type '{}' is not a DNS-SD service type",
                self.service_type
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity cannot be 0".to_string());
        }

        if let Some(name) = &self.instance_name {
            if name.trim().is_empty() {
                return Err("instance_name cannot be blank".to_string());
            }
        }

        Ok(())
    }
}

/// Normalizes a service type to the `_svc._proto.local.` form.
pub fn qualify_service_type(service_type: &str) -> String {
    let trimmed = service_type.trim_end_matches('.');
    if trimmed.ends_with(".local") {
        format!("{}.", trimmed)
    } else {
        format!("{}.local.", trimmed)
    }
}

// Default configuration values
fn default_enabled() -> bool {
    true
}

fn default_service_type() -> String {
    HTTP_SERVICE_TYPE.to_string()
}

fn default_probe_on_resolve() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    1000
}
