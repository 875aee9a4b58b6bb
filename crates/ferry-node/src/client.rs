//! Client-side protocol operations.
//!
//! Drives store/fetch/delete against a remote node. Each operation opens a
//! fresh connection, sends its envelope (and payload, for store) through a
//! write-side codec, and for fetch reads the `download` response from a
//! read-side codec over the same connection.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use ferry_net::{dial, DEFAULT_DIAL_TIMEOUT};
use ferry_proto::{Command, Envelope, FrameReader, FrameWriter};
use tokio::fs::File;
use tracing::{debug, info};

use crate::NodeError;

/// Default object ID attached to CLI-driven requests.
pub const DEFAULT_OBJECT_ID: &str = "001";

/// A protocol client identified by an origin ID.
pub struct Client {
    origin_id: String,
    dial_timeout: Duration,
}

impl Client {
    /// Creates a client that stamps requests with `origin_id`.
    pub fn new(origin_id: impl Into<String>) -> Self {
        Self {
            origin_id: origin_id.into(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }

    /// Overrides the connect timeout.
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Stores a local file on the remote node. Returns the payload size.
    pub async fn send_file(&self, addr: &str, path: &Path, id: &str) -> Result<u64, NodeError> {
        let envelope = self.envelope_for(path, id, Command::Store)?;
        let mut file = File::open(path).await?;

        info!(%addr, object = %envelope.object_name(), "sending file");
        let stream = dial(addr, self.dial_timeout).await?;
        let mut writer = FrameWriter::new(stream);
        writer.send_envelope(&envelope).await?;
        let bytes = writer.send_stream_framed(&mut file).await?;
        writer.shutdown().await?;

        debug!(%addr, bytes, "file sent");
        Ok(bytes)
    }

    /// Fetches an object from the remote node.
    ///
    /// Returns the `download` response envelope and the payload bytes.
    pub async fn fetch_file(
        &self,
        addr: &str,
        path: &Path,
        id: &str,
    ) -> Result<(Envelope, Bytes), NodeError> {
        let envelope = self.envelope_for(path, id, Command::Fetch)?;

        info!(%addr, object = %envelope.object_name(), "fetching file");
        let stream = dial(addr, self.dial_timeout).await?;
        let (read_half, write_half) = stream.into_split();

        let mut writer = FrameWriter::new(write_half);
        writer.send_envelope(&envelope).await?;
        writer.shutdown().await?;

        let mut reader = FrameReader::new(read_half);
        let response = reader
            .read_envelope()
            .await?
            .ok_or_else(|| NodeError::Protocol("connection closed without a response".to_string()))?;
        if response.command != Command::Download {
            return Err(NodeError::Protocol(format!(
                "unexpected response command: {}",
                response.command
            )));
        }
        let payload = reader
            .read_frame()
            .await?
            .ok_or_else(|| NodeError::Protocol("response payload missing".to_string()))?;

        debug!(%addr, bytes = payload.len(), "fetch complete");
        Ok((response, payload))
    }

    /// Deletes an object on the remote node.
    pub async fn delete_file(&self, addr: &str, path: &Path, id: &str) -> Result<(), NodeError> {
        let envelope = self.envelope_for(path, id, Command::Delete)?;

        info!(%addr, object = %envelope.object_name(), "deleting file");
        let stream = dial(addr, self.dial_timeout).await?;
        let mut writer = FrameWriter::new(stream);
        writer.send_envelope(&envelope).await?;
        writer.shutdown().await?;
        Ok(())
    }

    fn envelope_for(&self, path: &Path, id: &str, command: Command) -> Result<Envelope, NodeError> {
        let (filename, extension) = object_key(path)?;
        Ok(Envelope::new(id, filename, extension, command, &self.origin_id))
    }
}

/// Splits a local path into the protocol's (filename, extension) pair.
///
/// The protocol addresses objects as `name.ext`, so a path without an
/// extension cannot be keyed.
pub fn object_key(path: &Path) -> Result<(String, String), NodeError> {
    let bad = || NodeError::BadPath(path.display().to_string());
    let filename = path.file_stem().and_then(|s| s.to_str()).ok_or_else(bad)?;
    let extension = path.extension().and_then(|s| s.to_str()).ok_or_else(bad)?;
    if filename.is_empty() || extension.is_empty() {
        return Err(bad());
    }
    Ok((filename.to_string(), extension.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_from_path() {
        let (name, ext) = object_key(Path::new("/tmp/docs/report.pdf")).unwrap();
        assert_eq!(name, "report");
        assert_eq!(ext, "pdf");
    }

    #[test]
    fn test_object_key_requires_extension() {
        assert!(matches!(
            object_key(Path::new("/tmp/no_extension")),
            Err(NodeError::BadPath(_))
        ));
    }

    #[test]
    fn test_object_key_relative_path() {
        let (name, ext) = object_key(Path::new("a.txt")).unwrap();
        assert_eq!(name, "a");
        assert_eq!(ext, "txt");
    }
}
