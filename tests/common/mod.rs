//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use filedrop_client::{ProgressCallback, TransferClient, TransferError};
use filedrop_core::config::ReceiverConfig;
use filedrop_core::{Server, StatusResponse, UploadResponse};
use filedrop_discovery::{
    ChannelTransport, DiscoveryConfig, DiscoverySession, ResolvedService, TransportEvent,
};
use filedrop_receiver::ReceiverServer;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Upper bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// `10.0.0.<last>`
pub fn lan_addr(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
}

/// Resolved event for `name` at `10.0.0.<last>:port`
pub fn resolved(name: &str, last: u8, port: u16) -> TransportEvent {
    TransportEvent::Resolved(ResolvedService::new(name, lan_addr(last), port))
}

pub fn found(name: &str) -> TransportEvent {
    TransportEvent::Found {
        name: name.to_string(),
    }
}

pub fn lost(name: &str) -> TransportEvent {
    TransportEvent::Lost {
        name: name.to_string(),
    }
}

/// Status client whose answers are scripted per address.
///
/// Unscripted addresses answer with the default. When created `held`, each
/// status check waits for a permit from [`release`](Self::release).
pub struct ScriptedClient {
    default_reachable: bool,
    reachable: Mutex<HashMap<SocketAddr, bool>>,
    gate: Option<Semaphore>,
    completed: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(default_reachable: bool) -> Self {
        Self {
            default_reachable,
            reachable: Mutex::new(HashMap::new()),
            gate: None,
            completed: AtomicUsize::new(0),
        }
    }

    pub fn held(default_reachable: bool) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(default_reachable)
        }
    }

    pub fn script(&self, addr: SocketAddr, reachable: bool) {
        self.reachable.lock().insert(addr, reachable);
    }

    /// Lets `n` held status checks finish
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Number of status checks that have answered
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub async fn wait_completed(&self, n: usize) {
        tokio::time::timeout(TEST_TIMEOUT, async {
            while self.completed() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("status checks did not complete");
    }
}

#[async_trait]
impl TransferClient for ScriptedClient {
    async fn check_status(&self, addr: SocketAddr) -> filedrop_client::Result<StatusResponse> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let reachable = self
            .reachable
            .lock()
            .get(&addr)
            .copied()
            .unwrap_or(self.default_reachable);
        self.completed.fetch_add(1, Ordering::SeqCst);

        if reachable {
            Ok(StatusResponse {
                status: "ok".to_string(),
                server_name: format!("receiver-{}", addr),
                timestamp: "2024-01-01T00:00:00.000Z".to_string(),
            })
        } else {
            Err(TransferError::Connection {
                addr,
                reason: "connection refused".to_string(),
            })
        }
    }

    async fn upload_file(
        &self,
        addr: SocketAddr,
        _path: &Path,
        _on_progress: ProgressCallback,
    ) -> filedrop_client::Result<UploadResponse> {
        Err(TransferError::Connection {
            addr,
            reason: "uploads are not scripted".to_string(),
        })
    }
}

/// Session fed by a channel transport, already started
pub fn started_session(
    config: DiscoveryConfig,
    client: Arc<ScriptedClient>,
) -> (DiscoverySession, ChannelTransport) {
    let transport = ChannelTransport::new();
    let session = DiscoverySession::new(config, Arc::new(transport.clone()), client);
    session.start().expect("session start");
    (session, transport)
}

/// Emits every event, failing the test if one is not delivered
pub async fn emit_all(transport: &ChannelTransport, events: impl IntoIterator<Item = TransportEvent>) {
    for event in events {
        assert!(transport.emit(event).await, "event not delivered");
    }
}

/// Waits until the published snapshot satisfies `predicate`
pub async fn wait_for_servers<F>(session: &DiscoverySession, predicate: F) -> Vec<Server>
where
    F: FnMut(&Vec<Server>) -> bool,
{
    let mut servers = session.servers();
    let snapshot = tokio::time::timeout(TEST_TIMEOUT, servers.wait_for(predicate))
        .await
        .expect("timed out waiting for servers")
        .expect("registry dropped")
        .clone();
    snapshot
}

/// Receiver bound to an ephemeral localhost port, without announcement
pub struct TestReceiver {
    pub addr: SocketAddr,
    pub upload_dir: tempfile::TempDir,
    task: JoinHandle<()>,
}

impl TestReceiver {
    pub async fn start(max_upload_bytes: u64) -> Self {
        let upload_dir = tempfile::tempdir().expect("upload dir");
        let config = ReceiverConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            upload_dir: upload_dir.path().to_path_buf(),
            max_upload_bytes,
            announce: false,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let server = ReceiverServer::new(config).with_discovery(DiscoveryConfig {
            instance_name: Some("test-receiver".to_string()),
            ..Default::default()
        });

        let task = tokio::spawn(async move {
            server
                .serve(listener, std::future::pending())
                .await
                .expect("receiver failed");
        });

        Self {
            addr,
            upload_dir,
            task,
        }
    }
}

impl Drop for TestReceiver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Listener answering every request with `200 OK` and a fixed JSON body
pub struct StubReceiver {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl StubReceiver {
    pub async fn start(body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );

        let task = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let response = response.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { addr, task }
    }
}

impl Drop for StubReceiver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// An address nothing listens on
pub fn closed_port() -> SocketAddr {
    let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    addr
}
