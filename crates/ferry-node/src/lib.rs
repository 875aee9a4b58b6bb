//! Ferry Node - Per-connection sessions, server lifecycle, and client operations.
//!
//! This crate ties the transport, codec, and storage layers together:
//! - [`Session`] runs the command dispatch loop for one accepted connection
//! - [`Server`] owns the transport and storage engine and tracks sessions
//! - [`Client`] drives the protocol from the requesting side

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod server;
pub mod session;

pub use client::Client;
pub use server::{Server, ServerConfig};
pub use session::Session;

use thiserror::Error;

/// Errors from node-level operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage failure
    #[error("storage error: {0}")]
    Store(#[from] ferry_store::StoreError),

    /// Transport failure
    #[error("transport error: {0}")]
    Transport(#[from] ferry_net::TransportError),

    /// Framing or envelope codec failure
    #[error("framing error: {0}")]
    Frame(#[from] ferry_proto::FrameError),

    /// Peer violated the protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A local path could not be turned into an object key
    #[error("cannot derive object key from path: {0}")]
    BadPath(String),
}
