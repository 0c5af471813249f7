//! Discovery session
//!
//! The session owns one subscription to a [`DiscoveryTransport`] and turns
//! its events into registry mutations:
//!
//! | event | action |
//! |---|---|
//! | found | ask the transport to resolve the service |
//! | lost | remove the server |
//! | resolved | upsert the server, then probe it in the background |
//! | resolve failed | log |
//!
//! Events are handled one at a time by a single task, so events for the same
//! service are applied in the order they were received. Probes run on their
//! own tasks and may finish in any order.

use async_channel::Receiver;
use filedrop_client::TransferClient;
use filedrop_core::Server;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::prober::AvailabilityProber;
use crate::registry::ServerRegistry;
use crate::transport::DiscoveryTransport;
use crate::types::{ResolvedService, SessionState, TransportEvent};

struct Subscription {
    service_type: String,
    task: JoinHandle<()>,
}

/// Lifecycle owner of service discovery
pub struct DiscoverySession {
    config: DiscoveryConfig,
    transport: Arc<dyn DiscoveryTransport>,
    registry: Arc<ServerRegistry>,
    prober: AvailabilityProber,
    state: watch::Sender<SessionState>,

    /// Held for the whole of `start`/`stop`, which serializes them
    subscription: Mutex<Option<Subscription>>,
}

impl DiscoverySession {
    /// Creates a stopped session with a fresh registry
    pub fn new(
        config: DiscoveryConfig,
        transport: Arc<dyn DiscoveryTransport>,
        client: Arc<dyn TransferClient>,
    ) -> Self {
        Self::with_registry(config, transport, client, Arc::new(ServerRegistry::new()))
    }

    /// Creates a stopped session publishing into an existing registry
    pub fn with_registry(
        config: DiscoveryConfig,
        transport: Arc<dyn DiscoveryTransport>,
        client: Arc<dyn TransferClient>,
        registry: Arc<ServerRegistry>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Stopped);
        let prober = AvailabilityProber::new(client, registry.clone());

        Self {
            config,
            transport,
            registry,
            prober,
            state,
            subscription: Mutex::new(None),
        }
    }

    /// Subscribes to the configured service type.
    ///
    /// Does nothing when already active or when discovery is disabled. A
    /// failed subscription is returned once and leaves the session stopped;
    /// it is not retried. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            debug!("Discovery already active");
            return Ok(());
        }

        if !self.config.enabled {
            info!("Discovery is disabled in configuration");
            return Ok(());
        }

        self.config
            .validate()
            .map_err(DiscoveryError::InvalidConfig)?;

        let service_type = self.config.qualified_service_type();
        self.state.send_replace(SessionState::Starting);

        let events = match self.subscribe(&service_type) {
            Ok(events) => events,
            Err(e) => {
                error!(service_type = %service_type, error = %e, "Failed to start discovery");
                self.state.send_replace(SessionState::Stopped);
                return Err(e);
            }
        };

        let handler = EventHandler {
            service_type: service_type.clone(),
            transport: self.transport.clone(),
            registry: self.registry.clone(),
            prober: self.prober.clone(),
            probe_on_resolve: self.config.probe_on_resolve,
        };
        let task = tokio::spawn(handler.run(events));

        *subscription = Some(Subscription {
            service_type: service_type.clone(),
            task,
        });
        self.state.send_replace(SessionState::Active);

        info!(service_type = %service_type, "Discovery started");
        Ok(())
    }

    fn subscribe(&self, service_type: &str) -> Result<Receiver<TransportEvent>> {
        tokio::runtime::Handle::try_current().map_err(|e| DiscoveryError::SubscribeFailed {
            service_type: service_type.to_string(),
            reason: e.to_string(),
        })?;

        self.transport
            .subscribe(service_type, self.config.event_channel_capacity)
    }

    /// Ends the subscription.
    ///
    /// Does nothing when not active. Probes already running are allowed to
    /// finish; their outcomes still reach the registry.
    pub fn stop(&self) -> Result<()> {
        let mut subscription = self.subscription.lock();
        let Some(active) = subscription.take() else {
            return Ok(());
        };

        self.state.send_replace(SessionState::Stopping);
        active.task.abort();

        let result = self.transport.unsubscribe(&active.service_type);
        self.state.send_replace(SessionState::Stopped);

        match &result {
            Ok(()) => info!(service_type = %active.service_type, "Discovery stopped"),
            Err(e) => warn!(service_type = %active.service_type, error = %e, "Discovery stopped uncleanly"),
        }
        result
    }

    /// Probes every known server again.
    ///
    /// Returns the probe tasks; each resolves to the availability it found.
    pub fn refresh(&self) -> Vec<JoinHandle<bool>> {
        let servers = self.registry.snapshot_with_generations();
        info!(servers = servers.len(), "Refreshing server availability");

        servers
            .into_iter()
            .map(|(server, generation)| self.prober.spawn(server, generation))
            .collect()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribes to lifecycle state changes
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Returns true while subscribed
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Registry the session publishes into
    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// Subscribes to server list snapshots
    pub fn servers(&self) -> watch::Receiver<Vec<Server>> {
        self.registry.subscribe()
    }

    /// Session configuration
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        if let Some(active) = self.subscription.get_mut().take() {
            warn!("Discovery session dropped while active");
            active.task.abort();
            let _ = self.transport.unsubscribe(&active.service_type);
        }
    }
}

impl std::fmt::Debug for DiscoverySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoverySession")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("servers", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Applies transport events to the registry
struct EventHandler {
    service_type: String,
    transport: Arc<dyn DiscoveryTransport>,
    registry: Arc<ServerRegistry>,
    prober: AvailabilityProber,
    probe_on_resolve: bool,
}

impl EventHandler {
    async fn run(self, events: Receiver<TransportEvent>) {
        while let Ok(event) = events.recv().await {
            self.handle(event);
        }
        warn!(service_type = %self.service_type, "Discovery event stream ended");
    }

    fn handle(&self, event: TransportEvent) {
        metrics::counter!("filedrop_discovery_events_total", "kind" => event.kind()).increment(1);

        match event {
            TransportEvent::Found { name } => {
                debug!(service = %name, "Service found");
                if let Err(e) = self.transport.resolve(&self.service_type, &name) {
                    warn!(service = %name, error = %e, "Failed to request resolution");
                }
            }

            TransportEvent::Lost { name } => match self.registry.remove(&name) {
                Some(server) => info!(server = %server.id, "Server lost"),
                None => debug!(service = %name, "Lost unknown service"),
            },

            TransportEvent::Resolved(service) => match server_from(&service) {
                Ok(server) => {
                    info!(
                        server = %server.id,
                        address = %server.socket_addr(),
                        "Server resolved"
                    );
                    let generation = self.registry.upsert(server.clone());
                    if self.probe_on_resolve {
                        self.prober.spawn(server, generation);
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring resolved service"),
            },

            TransportEvent::ResolveFailed { name, error_code } => {
                warn!(service = %name, error_code, "Service resolution failed");
            }
        }
    }
}

/// Builds a server from a resolved record, rejecting unusable records.
fn server_from(service: &ResolvedService) -> Result<Server> {
    if service.name.is_empty() {
        return Err(DiscoveryError::resolution("<unnamed>", "empty service name"));
    }
    if service.port == 0 {
        return Err(DiscoveryError::resolution(&service.name, "port 0"));
    }

    let address = usable_address(service)
        .ok_or_else(|| DiscoveryError::resolution(&service.name, "no usable address"))?;

    Ok(Server::discovered(service.name.clone(), address, service.port))
}

fn usable_address(service: &ResolvedService) -> Option<IpAddr> {
    service
        .primary_address()
        .filter(|addr| !addr.is_unspecified())
        .or_else(|| {
            service
                .addresses
                .iter()
                .copied()
                .find(|addr| !addr.is_unspecified())
        })
}
