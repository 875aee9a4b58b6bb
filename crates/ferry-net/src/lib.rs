//! Ferry Net - TCP transport layer.
//!
//! Owns the listener and accept loop, hands accepted connections to the
//! server over a bounded queue, and dials outbound peers with a connect
//! timeout. Also hosts the optional peer liveness registry.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod peers;
pub mod transport;

pub use peers::{InMemoryPeerRegistry, Peer, PeerDirectory};
pub use transport::{dial, TcpTransport, TransportConfig, TransportError};

use std::time::Duration;

/// Default outbound connect timeout.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of the accepted-connection queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default idle threshold before a peer is considered stale.
pub const DEFAULT_PEER_IDLE: Duration = Duration::from_secs(300);
