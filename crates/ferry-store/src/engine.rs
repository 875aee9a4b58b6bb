//! Storage engine: hash-sharded object store.
//!
//! The object path is a pure function of the envelope key:
//! `<root>/<hex(sha256(ID)[..3])>/<Filename>.<Extension>`. The 3-byte hash
//! prefix gives 2^24 shard buckets and exists only to bound directory fan-out.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use ferry_proto::Envelope;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{info, warn};

use crate::{StoreConfig, StoreError};

/// Durable object store keyed by derived path.
///
/// Concurrency: each operation holds an async mutex scoped to the object's
/// shard for the duration of its filesystem work, so operations on distinct
/// shards proceed in parallel while same-shard operations serialize.
pub struct StorageEngine {
    config: StoreConfig,
    shard_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl StorageEngine {
    /// Opens (creating if needed) a storage engine rooted at the configured
    /// directory.
    pub async fn open(config: StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.root).await?;
        info!(root = %config.root.display(), "storage engine opened");
        Ok(Self {
            config,
            shard_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the storage root directory.
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Returns the shard bucket for an object ID: hex of the first 3 bytes
    /// of its SHA-256.
    pub fn shard(id: &str) -> String {
        let digest = Sha256::digest(id.as_bytes());
        hex::encode(&digest[..3])
    }

    /// Derives the on-disk path for an envelope's object key.
    ///
    /// Rejects names that would escape the shard directory. This runs before
    /// every filesystem call; the engine never opens a path that has not been
    /// validated.
    pub fn object_path(&self, envelope: &Envelope) -> Result<PathBuf, StoreError> {
        let name = envelope.object_name();
        validate_object_name(&name)?;
        Ok(self
            .config
            .root
            .join(Self::shard(&envelope.id))
            .join(name))
    }

    /// Stores the full contents of `reader` under the envelope's key,
    /// creating shard directories as needed and truncating any previous
    /// object. Returns the number of payload bytes written.
    pub async fn store<R>(&self, envelope: &Envelope, reader: &mut R) -> Result<u64, StoreError>
    where
        R: AsyncRead + Unpin,
    {
        let path = self.object_path(envelope)?;
        let lock = self.shard_lock(&envelope.id);
        let _guard = lock.lock().await;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = File::create(&path).await?;
        let written = tokio::io::copy(reader, &mut file).await?;
        file.flush().await?;

        if written == 0 {
            warn!(path = %path.display(), "stored object is empty");
        } else {
            info!(path = %path.display(), bytes = written, "object stored");
        }
        Ok(written)
    }

    /// Opens the object under the envelope's key for reading.
    pub async fn read(&self, envelope: &Envelope) -> Result<File, StoreError> {
        let path = self.object_path(envelope)?;
        let lock = self.shard_lock(&envelope.id);
        let _guard = lock.lock().await;

        match File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(envelope.object_name()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the object under the envelope's key.
    pub async fn delete(&self, envelope: &Envelope) -> Result<(), StoreError> {
        let path = self.object_path(envelope)?;
        let lock = self.shard_lock(&envelope.id);
        let _guard = lock.lock().await;

        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "object deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(envelope.object_name()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn shard_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let shard = Self::shard(id);
        let mut locks = self.shard_locks.lock();
        locks
            .entry(shard)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Rejects object names that are empty, absolute, or contain traversal or
/// separator components.
fn validate_object_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(StoreError::UnsafePath(name.to_string()));
    }
    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(StoreError::UnsafePath(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_proto::Command;
    use tempfile::TempDir;

    fn envelope(id: &str, filename: &str, extension: &str) -> Envelope {
        Envelope::new(id, filename, extension, Command::Store, "test-node")
    }

    async fn engine(dir: &TempDir) -> StorageEngine {
        StorageEngine::open(StoreConfig::new(dir.path()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_path_determinism() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        let a = engine.object_path(&envelope("1", "a", "txt")).unwrap();
        let b = engine.object_path(&envelope("1", "a", "txt")).unwrap();
        assert_eq!(a, b);

        let other_id = engine.object_path(&envelope("2", "a", "txt")).unwrap();
        assert_ne!(a, other_id);
    }

    #[tokio::test]
    async fn test_shard_is_three_byte_hex() {
        let shard = StorageEngine::shard("1");
        assert_eq!(shard.len(), 6);
        assert!(shard.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_store_and_read() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let env = envelope("1", "a", "txt");

        let written = engine.store(&env, &mut &b"hello"[..]).await.unwrap();
        assert_eq!(written, 5);

        let mut file = engine.read(&env).await.unwrap();
        let mut contents = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut file, &mut contents)
            .await
            .unwrap();
        assert_eq!(contents, "hello");
    }

    #[tokio::test]
    async fn test_overwrite_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let env = envelope("1", "a", "txt");

        engine.store(&env, &mut &b"first payload"[..]).await.unwrap();
        engine.store(&env, &mut &b"second"[..]).await.unwrap();

        let mut file = engine.read(&env).await.unwrap();
        let mut contents = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut file, &mut contents)
            .await
            .unwrap();
        assert_eq!(contents, "second");
    }

    #[tokio::test]
    async fn test_empty_store_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        let written = engine
            .store(&envelope("1", "empty", "bin"), &mut &b""[..])
            .await
            .unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        let err = engine.read(&envelope("1", "ghost", "txt")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_exactly_the_target() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let keep = envelope("1", "keep", "txt");
        let gone = envelope("2", "gone", "txt");

        engine.store(&keep, &mut &b"keep me"[..]).await.unwrap();
        engine.store(&gone, &mut &b"remove me"[..]).await.unwrap();

        engine.delete(&gone).await.unwrap();
        assert!(matches!(
            engine.read(&gone).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(engine.read(&keep).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        let err = engine
            .delete(&envelope("1", "ghost", "txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_traversal_names_rejected() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        for (filename, extension) in [
            ("../../etc/passwd", "txt"),
            ("", ""),
            ("a/b", "txt"),
            ("/abs", "txt"),
            ("a", "txt/../../x"),
        ] {
            let err = engine
                .object_path(&envelope("1", filename, extension))
                .unwrap_err();
            assert!(matches!(err, StoreError::UnsafePath(_)), "{filename:?}");
        }
    }
}
