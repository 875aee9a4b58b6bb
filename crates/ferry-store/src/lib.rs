//! Ferry Store - Local storage engine.
//!
//! Maps object keys to hash-sharded filesystem paths and performs durable
//! create/read/delete, serializing concurrent access per shard.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod engine;

pub use config::StoreConfig;
pub use engine::StorageEngine;

use thiserror::Error;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Derived path escapes the storage root or is otherwise unsafe
    #[error("unsafe object name: {0}")]
    UnsafePath(String),

    /// Object not present on disk
    #[error("object not found: {0}")]
    NotFound(String),
}
