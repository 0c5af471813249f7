//! mDNS transport and service announcement
//!
//! Browsing uses the `mdns-sd` daemon, which resolves every service it finds
//! on its own. Each browse gets a forwarder task that converts daemon events
//! into [`TransportEvent`]s.

use async_channel::Sender;
use dashmap::DashMap;
use mdns_sd::{ServiceDaemon, ServiceEvent as MdnsEvent, ServiceInfo};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{DiscoveryError, Result};
use crate::transport::DiscoveryTransport;
use crate::types::{ResolvedService, TransportEvent};

/// Instance name used when the host name cannot be determined
const FALLBACK_INSTANCE_NAME: &str = "filedrop";

/// Browses the local network through an mDNS daemon
pub struct MdnsTransport {
    mdns: ServiceDaemon,

    /// Forwarder tasks keyed by service type
    browsers: DashMap<String, JoinHandle<()>>,
}

impl MdnsTransport {
    /// Starts a private mDNS daemon
    pub fn new() -> Result<Self> {
        let mdns = ServiceDaemon::new().map_err(|e| {
            DiscoveryError::MdnsInitFailed(format!("Failed to create mDNS daemon: {}", e))
        })?;

        Ok(Self {
            mdns,
            browsers: DashMap::new(),
        })
    }

    fn stop_forwarder(&self, service_type: &str) {
        if let Some((_, task)) = self.browsers.remove(service_type) {
            task.abort();
        }
    }
}

impl DiscoveryTransport for MdnsTransport {
    fn subscribe(
        &self,
        service_type: &str,
        capacity: usize,
    ) -> Result<async_channel::Receiver<TransportEvent>> {
        let subscribe_failed = |reason: String| DiscoveryError::SubscribeFailed {
            service_type: service_type.to_string(),
            reason,
        };

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| subscribe_failed(e.to_string()))?;

        // A repeated browse replaces the previous one.
        if self.browsers.contains_key(service_type) {
            self.stop_forwarder(service_type);
            if let Err(e) = self.mdns.stop_browse(service_type) {
                debug!(service_type, error = %e, "Failed to stop previous browse");
            }
        }

        let browse = self
            .mdns
            .browse(service_type)
            .map_err(|e| subscribe_failed(e.to_string()))?;

        info!(service_type, "Browsing for services");

        let (tx, rx) = async_channel::bounded(capacity.max(1));
        let ty = service_type.to_string();
        let task = runtime.spawn(async move {
            loop {
                match browse.recv_async().await {
                    Ok(event) => {
                        if !forward(event, &ty, &tx).await {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(service_type = %ty, error = %e, "Browse channel closed");
                        break;
                    }
                }
            }
            debug!(service_type = %ty, "Browser task stopped");
        });

        self.browsers.insert(service_type.to_string(), task);
        Ok(rx)
    }

    fn unsubscribe(&self, service_type: &str) -> Result<()> {
        if !self.browsers.contains_key(service_type) {
            return Ok(());
        }
        self.stop_forwarder(service_type);

        self.mdns
            .stop_browse(service_type)
            .map_err(|e| DiscoveryError::UnsubscribeFailed {
                service_type: service_type.to_string(),
                reason: e.to_string(),
            })?;

        info!(service_type, "Stopped browsing");
        Ok(())
    }

    fn resolve(&self, service_type: &str, name: &str) -> Result<()> {
        // The daemon resolves found services without being asked.
        debug!(service_type, service = name, "Resolution pending");
        Ok(())
    }
}

impl Drop for MdnsTransport {
    fn drop(&mut self) {
        for entry in self.browsers.iter() {
            entry.value().abort();
        }
        if let Err(e) = self.mdns.shutdown() {
            warn!(error = %e, "Failed to shut down mDNS daemon");
        }
    }
}

impl std::fmt::Debug for MdnsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdnsTransport")
            .field("browsers", &self.browsers.len())
            .finish_non_exhaustive()
    }
}

/// Sends the converted event; false once the subscriber is gone.
async fn forward(event: MdnsEvent, service_type: &str, tx: &Sender<TransportEvent>) -> bool {
    let Some(event) = convert_event(event, service_type) else {
        return true;
    };

    if let Err(e) = tx.send(event).await {
        debug!(error = %e, "Subscriber gone, stopping forwarder");
        return false;
    }
    true
}

/// Maps a daemon event to a transport event; bookkeeping events map to None.
pub(crate) fn convert_event(event: MdnsEvent, service_type: &str) -> Option<TransportEvent> {
    match event {
        MdnsEvent::ServiceFound(_, fullname) => Some(TransportEvent::Found {
            name: instance_name(&fullname, service_type),
        }),

        MdnsEvent::ServiceResolved(info) => {
            debug!(
                service = info.get_fullname(),
                hostname = info.get_hostname(),
                port = info.get_port(),
                "Service resolved"
            );
            Some(TransportEvent::Resolved(convert_service_info(&info, service_type)))
        }

        MdnsEvent::ServiceRemoved(_, fullname) => Some(TransportEvent::Lost {
            name: instance_name(&fullname, service_type),
        }),

        MdnsEvent::SearchStarted(ty) => {
            debug!(service_type = %ty, "Search started");
            None
        }

        other => {
            debug!(event = ?other, "Ignoring mDNS event");
            None
        }
    }
}

fn convert_service_info(info: &ServiceInfo, service_type: &str) -> ResolvedService {
    let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
    addresses.sort();

    let properties: HashMap<String, String> = info
        .get_properties()
        .iter()
        .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
        .collect();

    ResolvedService {
        name: instance_name(info.get_fullname(), service_type),
        host: info.get_hostname().trim_end_matches('.').to_string(),
        addresses,
        port: info.get_port(),
        properties,
    }
}

/// Strips the service type from a full service name.
///
/// `"Office PC._http._tcp.local."` becomes `"Office PC"`.
pub(crate) fn instance_name(fullname: &str, service_type: &str) -> String {
    fullname
        .strip_suffix(service_type)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(fullname)
        .to_string()
}

/// Instance name derived from the machine's host name
pub fn default_instance_name() -> String {
    hostname::get()
        .ok()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_INSTANCE_NAME.to_string())
}

/// Advertises a local receiver over mDNS for as long as it is alive
pub struct ServiceAnnouncer {
    mdns: ServiceDaemon,
    fullname: String,
}

impl ServiceAnnouncer {
    /// Registers `instance_name` under `service_type` on `port`.
    ///
    /// Addresses are picked up from all local interfaces.
    pub fn announce(service_type: &str, instance_name: &str, port: u16) -> Result<Self> {
        let register_failed = |reason: String| DiscoveryError::RegisterFailed {
            service_name: instance_name.to_string(),
            reason,
        };

        if instance_name.is_empty() {
            return Err(DiscoveryError::InvalidConfig(
                "instance name cannot be empty".to_string(),
            ));
        }
        if port == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "announced port cannot be 0".to_string(),
            ));
        }

        let mdns = ServiceDaemon::new().map_err(|e| {
            DiscoveryError::MdnsInitFailed(format!("Failed to create mDNS daemon: {}", e))
        })?;

        let host_name = format!("{}.local.", default_instance_name());
        let mut properties = HashMap::new();
        properties.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());
        properties.insert("path".to_string(), "/".to_string());

        let service_info = ServiceInfo::new(
            service_type,
            instance_name,
            &host_name,
            "",
            port,
            properties,
        )
        .map_err(|e| register_failed(e.to_string()))?
        .enable_addr_auto();

        let fullname = service_info.get_fullname().to_string();
        if let Err(e) = mdns.register(service_info) {
            if let Err(shutdown) = mdns.shutdown() {
                error!(error = %shutdown, "Failed to shut down mDNS daemon");
            }
            return Err(register_failed(e.to_string()));
        }

        info!(
            instance = instance_name,
            service_type,
            port,
            "Service announcement registered"
        );

        Ok(Self { mdns, fullname })
    }

    /// Full service name being announced
    pub fn fullname(&self) -> &str {
        &self.fullname
    }
}

impl Drop for ServiceAnnouncer {
    fn drop(&mut self) {
        if let Err(e) = self.mdns.unregister(&self.fullname) {
            warn!(service = %self.fullname, error = %e, "Failed to unregister service");
        }
        if let Err(e) = self.mdns.shutdown() {
            warn!(error = %e, "Failed to shut down mDNS daemon");
        }
    }
}

impl std::fmt::Debug for ServiceAnnouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAnnouncer")
            .field("fullname", &self.fullname)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const HTTP: &str = "_http._tcp.local.";

    fn service_info(instance: &str, ip: &str, port: u16) -> ServiceInfo {
        let mut properties = HashMap::new();
        properties.insert("path".to_string(), "/".to_string());
        ServiceInfo::new(HTTP, instance, "office-pc.local.", ip, port, properties).unwrap()
    }

    #[test]
    fn test_instance_name() {
        assert_eq!(instance_name("Office PC._http._tcp.local.", HTTP), "Office PC");
        assert_eq!(instance_name("svc1", HTTP), "svc1");
        assert_eq!(instance_name("svc1._ftp._tcp.local.", HTTP), "svc1._ftp._tcp.local.");
    }

    #[test]
    fn test_convert_found_and_removed() {
        let found = convert_event(
            MdnsEvent::ServiceFound(HTTP.to_string(), "svc1._http._tcp.local.".to_string()),
            HTTP,
        );
        assert_eq!(
            found,
            Some(TransportEvent::Found {
                name: "svc1".to_string()
            })
        );

        let lost = convert_event(
            MdnsEvent::ServiceRemoved(HTTP.to_string(), "svc1._http._tcp.local.".to_string()),
            HTTP,
        );
        assert_eq!(
            lost,
            Some(TransportEvent::Lost {
                name: "svc1".to_string()
            })
        );
    }

    #[test]
    fn test_convert_resolved() {
        let event = convert_event(
            MdnsEvent::ServiceResolved(service_info("Office PC", "10.0.0.5", 8000)),
            HTTP,
        );

        let Some(TransportEvent::Resolved(service)) = event else {
            panic!("expected resolved event, got {:?}", event);
        };
        assert_eq!(service.name, "Office PC");
        assert_eq!(service.host, "office-pc.local");
        assert_eq!(service.port, 8000);
        assert_eq!(
            service.primary_address(),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)))
        );
        assert_eq!(service.properties.get("path").map(String::as_str), Some("/"));
    }

    #[test]
    fn test_search_events_are_dropped() {
        assert!(convert_event(MdnsEvent::SearchStarted(HTTP.to_string()), HTTP).is_none());
        assert!(convert_event(MdnsEvent::SearchStopped(HTTP.to_string()), HTTP).is_none());
    }

    #[test]
    fn test_default_instance_name_not_empty() {
        assert!(!default_instance_name().is_empty());
    }

    #[test]
    fn test_announce_rejects_invalid_input() {
        assert!(matches!(
            ServiceAnnouncer::announce(HTTP, "", 8000),
            Err(DiscoveryError::InvalidConfig(_))
        ));
        assert!(matches!(
            ServiceAnnouncer::announce(HTTP, "svc1", 0),
            Err(DiscoveryError::InvalidConfig(_))
        ));
    }
}
