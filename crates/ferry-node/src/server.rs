//! Server lifecycle orchestration.
//!
//! The server is an explicit handle: it owns the transport, the storage
//! engine, and the task consuming the accepted-connection queue. There is no
//! ambient global state; tests and binaries each hold their own instance.

use std::net::SocketAddr;
use std::sync::Arc;

use ferry_net::{TcpTransport, TransportConfig};
use ferry_store::{StorageEngine, StoreConfig};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::session::Session;
use crate::NodeError;

/// Server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Transport settings (bind address, dial timeout, queue capacity).
    pub transport: TransportConfig,
    /// Storage settings (root directory).
    pub store: StoreConfig,
}

impl ServerConfig {
    /// Builds a configuration for a bind address, deriving the storage root
    /// from it.
    pub fn for_addr(bind_addr: SocketAddr) -> Self {
        Self {
            transport: TransportConfig {
                bind_addr,
                ..Default::default()
            },
            store: StoreConfig::for_bind_addr(
                ferry_store::config::DEFAULT_STORAGE_BASE,
                &bind_addr.to_string(),
            ),
        }
    }
}

/// A running ferry server.
pub struct Server {
    engine: Arc<StorageEngine>,
    transport: TcpTransport,
    consumer: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl Server {
    /// Opens the storage engine, binds the transport, and starts serving.
    pub async fn start(config: ServerConfig) -> Result<Self, NodeError> {
        let engine = Arc::new(StorageEngine::open(config.store).await?);
        let mut transport = TcpTransport::listen(config.transport).await?;
        let local_addr = transport.local_addr();

        let incoming = match transport.take_incoming() {
            Some(incoming) => incoming,
            None => {
                return Err(NodeError::Protocol(
                    "transport connection queue already consumed".to_string(),
                ))
            }
        };
        let consumer = tokio::spawn(consume_connections(incoming, engine.clone()));

        info!(addr = %local_addr, "server started");
        Ok(Self {
            engine,
            transport,
            consumer: Some(consumer),
            local_addr,
        })
    }

    /// Returns the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the storage engine backing this server.
    pub fn engine(&self) -> Arc<StorageEngine> {
        self.engine.clone()
    }

    /// Stops accepting connections and waits for in-flight sessions to
    /// finish naturally.
    ///
    /// Blocked session reads are not interrupted; they end on their own
    /// stream's end or error. Consuming `self` makes a second shutdown
    /// unrepresentable.
    pub async fn shutdown(mut self) {
        self.transport.close().await;
        if let Some(consumer) = self.consumer.take() {
            let _ = consumer.await;
        }
        info!(addr = %self.local_addr, "server shut down");
    }
}

/// Consumes the connection queue, spawning one session task per connection.
///
/// Ends when the queue closes (transport shut down), then drains every
/// remaining session.
async fn consume_connections(mut incoming: mpsc::Receiver<TcpStream>, engine: Arc<StorageEngine>) {
    let mut sessions = JoinSet::new();

    while let Some(stream) = incoming.recv().await {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let engine = engine.clone();
        sessions.spawn(async move {
            Session::new(engine, peer).run(stream).await;
        });

        // Reap sessions that already finished so the set stays small.
        while let Some(result) = sessions.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "session task failed");
            }
        }
    }

    debug!(in_flight = sessions.len(), "connection queue closed, draining sessions");
    while let Some(result) = sessions.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "session task failed");
        }
    }
}
