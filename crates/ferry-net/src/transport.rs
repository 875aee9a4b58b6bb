//! TCP listen/accept/dial with graceful shutdown.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{DEFAULT_DIAL_TIMEOUT, DEFAULT_QUEUE_CAPACITY};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Listener bind failure
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// Outbound connect failure
    #[error("dial failed: {0}")]
    Dial(#[source] std::io::Error),

    /// Outbound connect timed out
    #[error("dial timed out after {0:?}")]
    DialTimeout(Duration),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Listen address
    pub bind_addr: SocketAddr,
    /// Outbound connect timeout
    pub dial_timeout: Duration,
    /// Capacity of the accepted-connection queue
    pub queue_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".parse().expect("valid default addr"),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// TCP transport: accept loop feeding a bounded connection queue.
///
/// The accept loop runs as its own task. When it stops, the queue sender is
/// dropped, so consumers observe `None` — the "no more connections" signal.
pub struct TcpTransport {
    local_addr: SocketAddr,
    dial_timeout: Duration,
    incoming_rx: Option<mpsc::Receiver<TcpStream>>,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
}

impl TcpTransport {
    /// Binds the listener and starts the accept loop.
    pub async fn listen(config: TransportConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(TransportError::Bind)?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "transport listening");

        let (conn_tx, conn_rx) = mpsc::channel(config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(listener, conn_tx, shutdown_rx));

        Ok(Self {
            local_addr,
            dial_timeout: config.dial_timeout,
            incoming_rx: Some(conn_rx),
            shutdown_tx,
            accept_task: Some(accept_task),
        })
    }

    /// Returns the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Takes the receiving end of the connection queue.
    ///
    /// Yields `None` once the accept loop has stopped and the queue drained.
    pub fn take_incoming(&mut self) -> Option<mpsc::Receiver<TcpStream>> {
        self.incoming_rx.take()
    }

    /// Opens an outbound connection with this transport's connect timeout.
    pub async fn dial(&self, addr: &str) -> Result<TcpStream, TransportError> {
        dial(addr, self.dial_timeout).await
    }

    /// Stops the accept loop and waits for it to finish.
    ///
    /// Already-queued connections stay in the queue for the consumer to
    /// drain; draining in-flight handlers is the server's job.
    pub async fn close(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        info!("transport closed");
    }
}

/// Opens an outbound TCP connection, failing after `timeout`.
///
/// Failures are reported, never retried here.
pub async fn dial(addr: &str, timeout: Duration) -> Result<TcpStream, TransportError> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            debug!(%addr, "connected");
            Ok(stream)
        }
        Ok(Err(e)) => {
            error!(%addr, error = %e, "dial failed");
            Err(TransportError::Dial(e))
        }
        Err(_) => {
            error!(%addr, ?timeout, "dial timed out");
            Err(TransportError::DialTimeout(timeout))
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    conn_tx: mpsc::Sender<TcpStream>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("accept loop stopping");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    if conn_tx.send(stream).await.is_err() {
                        debug!("connection queue consumer gone, stopping accept loop");
                        break;
                    }
                }
                Err(e) if is_temporary_accept_error(&e) => {
                    warn!(error = %e, "transient accept error");
                }
                Err(e) => {
                    error!(error = %e, "accept failed, stopping accept loop");
                    break;
                }
            }
        }
    }
    // conn_tx drops here, closing the queue.
}

fn is_temporary_accept_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::Interrupted
    )
}
