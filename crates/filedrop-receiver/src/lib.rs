//! Filedrop receiver - HTTP endpoint that accepts dropped files
//!
//! The receiver is the counterpart of the transfer client: it answers status
//! probes, stores uploaded files under a configurable directory and
//! announces itself over mDNS so clients on the LAN can find it.
//!
//! # Features
//!
//! - `GET /status` and `POST /upload` with JSON answers
//! - Streamed multipart uploads with a per-file size limit
//! - mDNS announcement as an `_http._tcp` service
//! - Optional Prometheus metrics at `/metrics`
//!
//! # Example
//!
//! ```no_run
//! use filedrop_core::config::ReceiverConfig;
//! use filedrop_receiver::{shutdown_signal, ReceiverServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = ReceiverServer::new(ReceiverConfig::default());
//!     server.run(shutdown_signal()).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod routes;
pub mod storage;

pub use error::{ApiError, ReceiverError, Result};
pub use routes::{router, ReceiverState};
pub use storage::UploadStore;

use filedrop_core::config::ReceiverConfig;
use filedrop_discovery::{default_instance_name, DiscoveryConfig, ServiceAnnouncer};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// File receiver service
pub struct ReceiverServer {
    config: ReceiverConfig,
    discovery: DiscoveryConfig,
    metrics: Option<PrometheusHandle>,
}

impl ReceiverServer {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            discovery: DiscoveryConfig::default(),
            metrics: None,
        }
    }

    /// Sets the service type and instance name used for the announcement
    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    /// Serves `/metrics` from `handle`
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Name reported by `/status` and announced over mDNS
    pub fn instance_name(&self) -> String {
        self.discovery
            .instance_name
            .clone()
            .unwrap_or_else(default_instance_name)
    }

    /// Binds the configured address and serves until `shutdown` completes
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ReceiverError::Bind { addr, source })?;

        self.serve(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` completes
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.config.validate().map_err(|e| ReceiverError::InvalidConfig(e.to_string()))?;

        let store = UploadStore::new(&self.config.upload_dir, self.config.max_upload_bytes);
        store
            .ensure_dir()
            .await
            .map_err(|source| ReceiverError::UploadDir {
                path: self.config.upload_dir.clone(),
                source,
            })?;

        let local_addr = listener.local_addr().map_err(ReceiverError::Serve)?;
        let instance_name = self.instance_name();

        // Held until the server stops; dropping it withdraws the announcement.
        let _announcer = if self.config.announce {
            self.announce(&instance_name, local_addr)
        } else {
            None
        };

        let mut state = ReceiverState::new(instance_name.as_str(), store);
        if let Some(handle) = self.metrics {
            state = state.with_metrics(handle);
        }

        info!(
            address = %local_addr,
            upload_dir = %self.config.upload_dir.display(),
            max_upload_bytes = self.config.max_upload_bytes,
            "Receiver listening"
        );

        axum::serve(listener, router(state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ReceiverError::Serve)?;

        info!("Receiver shutdown complete");
        Ok(())
    }

    /// The receiver stays reachable by address when announcing fails.
    fn announce(&self, instance_name: &str, local_addr: SocketAddr) -> Option<ServiceAnnouncer> {
        let service_type = self.discovery.qualified_service_type();
        match ServiceAnnouncer::announce(&service_type, instance_name, local_addr.port()) {
            Ok(announcer) => Some(announcer),
            Err(e) => {
                warn!(error = %e, "mDNS announcement failed, continuing without it");
                None
            }
        }
    }
}

/// Completes on Ctrl-C or, on unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl-C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
