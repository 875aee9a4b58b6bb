//! Integration and end-to-end tests for ferry.
//!
//! This crate provides:
//! - A [`TestNode`] harness spinning up a real server on an ephemeral port
//! - End-to-end tests for the store/fetch/delete protocol over TCP

pub mod node;

pub use node::TestNode;

/// Initialize tracing for tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ferry_node=debug,ferry_store=debug,ferry_net=debug")
        .with_test_writer()
        .try_init();
}
