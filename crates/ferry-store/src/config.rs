//! Storage configuration.

use std::path::{Path, PathBuf};

/// Default base directory for node storage roots.
pub const DEFAULT_STORAGE_BASE: &str = "data_storage";

/// Storage engine configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory all objects live under.
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_STORAGE_BASE),
        }
    }
}

impl StoreConfig {
    /// Creates a configuration rooted at the given path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Derives a per-node root under `base` from the node's bind address.
    ///
    /// The `:` in `host:port` is not portable across filesystems, so it maps
    /// to `_`.
    pub fn for_bind_addr(base: impl AsRef<Path>, addr: &str) -> Self {
        let dir = addr.replace(':', "_");
        Self {
            root: base.as_ref().join(dir),
        }
    }
}
