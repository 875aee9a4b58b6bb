//! Test node implementation for integration testing.

use std::ops::Deref;
use std::sync::Arc;

use anyhow::Result;
use ferry_net::TransportConfig;
use ferry_node::{Client, Server, ServerConfig};
use ferry_store::{StorageEngine, StoreConfig};
use tempfile::TempDir;
use tracing::info;

/// A node under test: a real server on an ephemeral port with
/// temporary-directory storage, plus a client stamped with the node's name.
pub struct TestNode {
    server: Option<Server>,
    addr: String,
    client: Client,
    temp_dir: Arc<TempDir>,
}

/// A storage engine handle that keeps the node's temporary directory alive,
/// so tests can inspect storage even after the node has shut down.
pub struct EngineHandle {
    engine: Arc<StorageEngine>,
    _temp_dir: Arc<TempDir>,
}

impl Deref for EngineHandle {
    type Target = StorageEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

impl TestNode {
    /// Starts a node on `127.0.0.1` with an ephemeral port.
    pub async fn start(name: &str) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let config = ServerConfig {
            transport: TransportConfig {
                bind_addr: "127.0.0.1:0".parse()?,
                ..Default::default()
            },
            store: StoreConfig::new(temp_dir.path()),
        };

        let server = Server::start(config).await?;
        let addr = server.local_addr().to_string();
        info!(%addr, name, "test node started");

        Ok(Self {
            server: Some(server),
            addr,
            client: Client::new(name),
            temp_dir: Arc::new(temp_dir),
        })
    }

    /// The node's dialable address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The node's protocol client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The node's storage engine.
    pub fn engine(&self) -> EngineHandle {
        EngineHandle {
            engine: self
                .server
                .as_ref()
                .expect("node already shut down")
                .engine(),
            _temp_dir: self.temp_dir.clone(),
        }
    }

    /// Shuts the node down, draining in-flight sessions.
    pub async fn shutdown(mut self) {
        if let Some(server) = self.server.take() {
            server.shutdown().await;
        }
    }
}
