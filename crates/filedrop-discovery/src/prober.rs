//! Availability probing
//!
//! A probe asks the server for its status once and writes the outcome back
//! into the registry as the server's availability. Probes are never retried.

use filedrop_client::TransferClient;
use filedrop_core::Server;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::registry::{Generation, ServerRegistry};

/// Converts status checks into registry availability updates
#[derive(Clone)]
pub struct AvailabilityProber {
    client: Arc<dyn TransferClient>,
    registry: Arc<ServerRegistry>,
}

impl AvailabilityProber {
    /// Creates a prober writing into `registry`
    pub fn new(client: Arc<dyn TransferClient>, registry: Arc<ServerRegistry>) -> Self {
        Self { client, registry }
    }

    /// Checks `server` and records the outcome.
    ///
    /// Returns the availability that was determined. A server removed in
    /// the meantime is left absent.
    pub async fn probe(&self, server: &Server) -> bool {
        let available = self.check(server).await;
        self.registry.set_availability(&server.id, available);
        available
    }

    /// Probes `server` in the background.
    ///
    /// The outcome is only applied while the entry still has `generation`,
    /// so a probe against an outdated address cannot overwrite the result
    /// for the current one.
    pub fn spawn(&self, server: Server, generation: Generation) -> JoinHandle<bool> {
        let prober = self.clone();
        tokio::spawn(async move {
            let available = prober.check(&server).await;
            let applied = prober
                .registry
                .set_availability_for(&server.id, generation, available);

            if !applied {
                debug!(server = %server.id, generation, available, "Probe outcome discarded");
            }
            available
        })
    }

    async fn check(&self, server: &Server) -> bool {
        match self.client.check_status(server.socket_addr()).await {
            Ok(status) => {
                debug!(
                    server = %server.id,
                    server_name = %status.server_name,
                    "Server is available"
                );
                metrics::counter!("filedrop_probes_total", "outcome" => "available").increment(1);
                true
            }
            Err(e) => {
                info!(
                    server = %server.id,
                    address = %server.socket_addr(),
                    error = %e,
                    "Server is unavailable"
                );
                metrics::counter!("filedrop_probes_total", "outcome" => "unavailable").increment(1);
                false
            }
        }
    }
}

impl std::fmt::Debug for AvailabilityProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityProber")
            .field("servers", &self.registry.len())
            .finish_non_exhaustive()
    }
}
