use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use filedrop_client::{upload_reader, HttpTransferClient, ProgressCallback, TransferClient, UploadProgress};
use filedrop_core::config::{LogFormat, LoggingConfig};
use filedrop_core::{AppConfig, Server, UploadResponse};
use filedrop_discovery::{DiscoverySession, MdnsTransport};
use filedrop_receiver::{shutdown_signal, ReceiverServer};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Filedrop - send files to receivers on the local network
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List receivers announced on the network
    Discover {
        /// Seconds to browse before printing the final list
        #[arg(long, default_value = "5")]
        duration: u64,
    },

    /// Send a file to a receiver
    Send {
        /// File to send, or "-" for stdin
        file: PathBuf,

        /// Receiver instance name, as listed by `discover`
        #[arg(long, conflicts_with = "address", required_unless_present = "address")]
        server: Option<String>,

        /// Receiver address (IP:PORT), skipping discovery
        #[arg(long)]
        address: Option<SocketAddr>,

        /// Seconds to wait for the named receiver to appear
        #[arg(long, default_value = "10")]
        wait: u64,

        /// File name reported to the receiver when reading stdin
        #[arg(long, default_value = "stdin.bin")]
        name: String,
    },

    /// Run a receiver that accepts uploads
    Serve {
        /// Override the listening port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the upload directory
        #[arg(long)]
        upload_dir: Option<PathBuf>,

        /// Instance name to announce (host name if not set)
        #[arg(long)]
        name: Option<String>,

        /// Do not announce the receiver over mDNS
        #[arg(long)]
        no_announce: bool,

        /// Serve Prometheus metrics at /metrics
        #[arg(long)]
        metrics: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::from_config_builder(args.config.as_ref())
        .with_context(|| match &args.config {
            Some(path) => format!("Failed to load configuration from {:?}", path),
            None => "Failed to load configuration from environment".to_string(),
        })?;
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging, args.log_level.as_deref())?;

    match args.command {
        Command::Discover { duration } => discover(config, Duration::from_secs(duration)).await,
        Command::Send {
            file,
            server,
            address,
            wait,
            name,
        } => {
            let client = HttpTransferClient::new(&config.transfer)
                .context("Failed to create HTTP client")?;
            let addr = match (address, server) {
                (Some(addr), _) => addr,
                (None, Some(server)) => {
                    find_server(&config, &server, Duration::from_secs(wait)).await?.socket_addr()
                }
                (None, None) => bail!("either --server or --address is required"),
            };
            send(&client, addr, file, &name).await
        }
        Command::Serve {
            port,
            upload_dir,
            name,
            no_announce,
            metrics,
        } => {
            let mut config = config;
            if let Some(port) = port {
                config.receiver.port = port;
            }
            if let Some(upload_dir) = upload_dir {
                config.receiver.upload_dir = upload_dir;
            }
            if name.is_some() {
                config.discovery.instance_name = name;
            }
            if no_announce {
                config.receiver.announce = false;
            }
            serve(config, metrics).await
        }
    }
}

/// Installs the global subscriber; `RUST_LOG` takes precedence.
fn init_tracing(logging: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    let logging = match level_override {
        Some(level) => LoggingConfig {
            level: level.to_string(),
            ..logging.clone()
        },
        None => logging.clone(),
    };
    let level = logging.parse_level().context("Invalid log level")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    match logging.format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
    Ok(())
}

fn start_session(config: &AppConfig) -> Result<DiscoverySession> {
    let transport = Arc::new(MdnsTransport::new().context("Failed to start mDNS")?);
    let client = Arc::new(
        HttpTransferClient::new(&config.transfer).context("Failed to create HTTP client")?,
    );

    let session = DiscoverySession::new(config.discovery.clone(), transport, client);
    session.start().context("Failed to start discovery")?;
    Ok(session)
}

async fn discover(config: AppConfig, duration: Duration) -> Result<()> {
    let session = start_session(&config)?;
    let mut servers = session.servers();
    let deadline = Instant::now() + duration;

    info!(seconds = duration.as_secs(), "Browsing for receivers");

    loop {
        tokio::select! {
            changed = servers.changed() => {
                if changed.is_err() {
                    break;
                }
                let list = servers.borrow_and_update().clone();
                print_servers(&list);
            }
            _ = tokio::time::sleep_until(deadline) => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C signal");
                break;
            }
        }
    }

    let final_list = session.registry().snapshot();
    session.stop().context("Failed to stop discovery")?;

    if final_list.is_empty() {
        println!("No receivers found");
    } else {
        println!();
        print_servers(&final_list);
    }
    Ok(())
}

fn print_servers(servers: &[Server]) {
    println!("{:<32} {:<24} {}", "NAME", "ADDRESS", "STATUS");
    for server in servers {
        let status = if server.is_available { "available" } else { "unreachable" };
        println!("{:<32} {:<24} {}", server.name, server.socket_addr(), status);
    }
}

/// Browses until a receiver named `name` shows up or `wait` elapses.
async fn find_server(config: &AppConfig, name: &str, wait: Duration) -> Result<Server> {
    let session = start_session(config)?;
    let mut servers = session.servers();

    // The borrowed snapshot must be released before the registry is read.
    let found = tokio::time::timeout(
        wait,
        servers.wait_for(|list| list.iter().any(|s| s.name == name)),
    )
    .await
    .is_ok_and(|seen| seen.is_ok());

    let server = session.registry().find_by_name(name);
    session.stop().context("Failed to stop discovery")?;

    match (found, server) {
        (true, Some(server)) => {
            if !server.is_available {
                warn!(server = %server.id, "Receiver did not answer its status check");
            }
            Ok(server)
        }
        _ => bail!("Receiver '{}' not found within {}s", name, wait.as_secs()),
    }
}

async fn send(client: &HttpTransferClient, addr: SocketAddr, file: PathBuf, name: &str) -> Result<()> {
    let status = client
        .check_status(addr)
        .await
        .with_context(|| format!("Receiver at {} is not ready", addr))?;
    info!(receiver = %status.server_name, %addr, "Receiver ready");

    let on_progress: ProgressCallback = Arc::new(|progress: UploadProgress| {
        eprint!("\rUploading... {:>3}%", progress.percent);
        let _ = std::io::stderr().flush();
    });

    let result = if file.as_os_str() == "-" {
        upload_reader(client, addr, name, tokio::io::stdin(), on_progress).await
    } else {
        client.upload_file(addr, &file, on_progress).await
    };
    eprintln!();

    let response: UploadResponse = result.context("Upload failed")?;
    println!(
        "{} ({} bytes) stored on {} as {}",
        response.file.original_name, response.file.size, addr, response.file.path
    );
    Ok(())
}

async fn serve(config: AppConfig, metrics: bool) -> Result<()> {
    let mut server = ReceiverServer::new(config.receiver.clone()).with_discovery(config.discovery.clone());

    if metrics {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        server = server.with_metrics(handle);
    }

    info!(
        bind = %config.receiver.bind_addr(),
        announce = config.receiver.announce,
        "Starting receiver"
    );
    server.run(shutdown_signal()).await.context("Receiver failed")?;
    Ok(())
}
