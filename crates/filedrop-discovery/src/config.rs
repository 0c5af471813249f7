//! Configuration types for service discovery
//!
//! Re-exports configuration from filedrop-core so the binary and the library
//! share one definition

pub use filedrop_core::discovery_config::{qualify_service_type, DiscoveryConfig, HTTP_SERVICE_TYPE};
