//! Ferry Daemon - Background node for the ferry file transfer service.
//!
//! Provides:
//! - The TCP server accepting store/fetch/delete sessions
//! - An interactive command loop for driving transfers to other nodes
//! - Periodic liveness probing of configured peers

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::select;
use tokio::signal;
use tokio::time::interval;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use ferry_net::{dial, InMemoryPeerRegistry, PeerDirectory, DEFAULT_DIAL_TIMEOUT, DEFAULT_PEER_IDLE};
use ferry_node::client::DEFAULT_OBJECT_ID;
use ferry_node::{Client, Server, ServerConfig};
use ferry_proto::Command;
use ferry_store::{StorageEngine, StoreConfig};

/// Ferry daemon service.
#[derive(Parser)]
#[command(name = "ferryd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, default_value = "~/.ferry/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (default)
    Run {
        /// Listen address, overrides the configured one
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Listen port on all interfaces, overrides the configured address
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Daemon configuration.
#[derive(Debug, Clone)]
struct DaemonConfig {
    /// Listen address
    listen_addr: SocketAddr,
    /// Base directory for per-node storage roots
    storage_base: PathBuf,
    /// Identifier stamped into outgoing envelopes
    node_id: String,
    /// Interval between peer liveness sweeps
    peer_sweep_secs: u64,
    /// Statically configured peers as (id, addr) pairs
    peers: Vec<(String, String)>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".parse().expect("valid default addr"),
            storage_base: PathBuf::from(ferry_store::config::DEFAULT_STORAGE_BASE),
            node_id: "ferry-node".to_string(),
            peer_sweep_secs: DEFAULT_PEER_IDLE.as_secs(),
            peers: Vec::new(),
        }
    }
}

/// Load configuration from TOML file.
fn load_config(path: &PathBuf) -> Result<DaemonConfig> {
    let path = expand_tilde(path);

    if !path.exists() {
        info!("No config file found at {:?}, using defaults", path);
        return Ok(DaemonConfig::default());
    }

    let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
    let toml: toml::Value = content.parse().context("Failed to parse config file")?;

    let mut config = DaemonConfig::default();

    if let Some(node) = toml.get("node") {
        if let Some(listen) = node.get("listen_addr").and_then(|v| v.as_str()) {
            config.listen_addr = listen.parse().context("Invalid listen_addr")?;
        }
        if let Some(base) = node.get("storage_base").and_then(|v| v.as_str()) {
            config.storage_base = PathBuf::from(base);
        }
        if let Some(id) = node.get("node_id").and_then(|v| v.as_str()) {
            config.node_id = id.to_string();
        }
    }

    if let Some(peers) = toml.get("peers") {
        if let Some(secs) = peers.get("sweep_secs").and_then(|v| v.as_integer()) {
            config.peer_sweep_secs = secs as u64;
        }
        if let Some(entries) = peers.get("entries").and_then(|v| v.as_array()) {
            for entry in entries {
                let id = entry.get("id").and_then(|v| v.as_str());
                let addr = entry.get("addr").and_then(|v| v.as_str());
                if let (Some(id), Some(addr)) = (id, addr) {
                    config.peers.push((id.to_string(), addr.to_string()));
                } else {
                    warn!("Skipping malformed peer entry: {:?}", entry);
                }
            }
        }
    }

    Ok(config)
}

/// Expand ~ in paths.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let mut config = load_config(&cli.config)?;

    if let Some(Commands::Run { listen, port }) = cli.command {
        if let Some(listen) = listen {
            config.listen_addr = listen;
        } else if let Some(port) = port {
            config.listen_addr = SocketAddr::new("0.0.0.0".parse()?, port);
        }
    }

    run(config).await
}

async fn run(config: DaemonConfig) -> Result<()> {
    let server_config = ServerConfig {
        transport: ferry_net::TransportConfig {
            bind_addr: config.listen_addr,
            ..Default::default()
        },
        store: StoreConfig::for_bind_addr(&config.storage_base, &config.listen_addr.to_string()),
    };

    let server = Server::start(server_config)
        .await
        .context("Failed to start server")?;
    let engine = server.engine();
    let client = Client::new(config.node_id.clone());

    let registry = Arc::new(InMemoryPeerRegistry::new());
    for (id, addr) in &config.peers {
        registry.add_peer(id, addr);
    }

    println!("Ferry daemon running");
    println!("  Node ID: {}", config.node_id);
    println!("  Listen: {}", server.local_addr());
    println!("  Storage: {}", engine.root().display());
    println!();
    println!("Commands: send | fetch | delete | stop (Ctrl+C to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sweep = interval(Duration::from_secs(config.peer_sweep_secs.max(1)));
    sweep.tick().await; // first tick fires immediately, skip it

    loop {
        select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(input)) => {
                        if !handle_command(&input, &client, &engine).await {
                            info!("Stop requested");
                            break;
                        }
                    }
                    Ok(None) => {
                        // stdin closed; keep serving until a signal arrives
                        signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read command input: {}", e);
                        break;
                    }
                }
            }

            _ = sweep.tick() => {
                sweep_peers(&registry).await;
            }

            _ = signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    server.shutdown().await;
    info!("Daemon stopped");
    Ok(())
}

/// Handles one interactive command line. Returns `false` on `stop`.
async fn handle_command(input: &str, client: &Client, engine: &Arc<StorageEngine>) -> bool {
    let parts: Vec<&str> = input.split_whitespace().collect();
    let Some(&command) = parts.first() else {
        return true;
    };

    match command {
        "send" => {
            if parts.len() < 3 {
                println!("Usage: send <destination IP:port> <file path>");
                return true;
            }
            match client.send_file(parts[1], Path::new(parts[2]), DEFAULT_OBJECT_ID).await {
                Ok(bytes) => println!("Sent {} ({} bytes)", parts[2], bytes),
                Err(e) => error!("Failed to send file: {}", e),
            }
        }
        "fetch" => {
            if parts.len() < 3 {
                println!("Usage: fetch <destination IP:port> <file path>");
                return true;
            }
            match client.fetch_file(parts[1], Path::new(parts[2]), DEFAULT_OBJECT_ID).await {
                Ok((envelope, payload)) => {
                    // Fetched objects land in this node's own storage.
                    let stored = envelope.with_command(Command::Store);
                    match engine.store(&stored, &mut payload.as_ref()).await {
                        Ok(bytes) => println!("Fetched {} ({} bytes)", stored.object_name(), bytes),
                        Err(e) => error!("Failed to store fetched object: {}", e),
                    }
                }
                Err(e) => error!("Failed to fetch file: {}", e),
            }
        }
        "delete" => {
            if parts.len() < 3 {
                println!("Usage: delete <destination IP:port> <file path>");
                return true;
            }
            match client.delete_file(parts[1], Path::new(parts[2]), DEFAULT_OBJECT_ID).await {
                Ok(()) => println!("Deleted {} from {}", parts[2], parts[1]),
                Err(e) => error!("Failed to delete file: {}", e),
            }
        }
        "stop" => return false,
        _ => println!("Unknown command"),
    }
    true
}

/// Probes stale peers and records the outcome.
async fn sweep_peers(registry: &Arc<InMemoryPeerRegistry>) {
    for peer in registry.sweep_stale(DEFAULT_PEER_IDLE) {
        match dial(&peer.addr, DEFAULT_DIAL_TIMEOUT).await {
            Ok(_) => {
                info!(peer = %peer.id, addr = %peer.addr, "peer reachable");
                registry.mark_connected(&peer.id, true);
            }
            Err(e) => {
                warn!(peer = %peer.id, addr = %peer.addr, error = %e, "peer unreachable");
                registry.mark_connected(&peer.id, false);
            }
        }
    }
}
