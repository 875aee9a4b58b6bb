//! Per-connection command dispatch loop.
//!
//! A session owns one accepted connection. It repeatedly decodes an envelope
//! frame and dispatches on its command; the loop is unbounded, so one
//! connection may carry arbitrarily many sequential commands. The only
//! non-error termination is a clean end of stream at a frame boundary.

use std::sync::Arc;

use ferry_proto::{Command, Envelope, FrameError, FrameReader, FrameWriter};
use ferry_store::StorageEngine;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// The per-connection execution context.
pub struct Session {
    engine: Arc<StorageEngine>,
    peer: String,
}

impl Session {
    /// Creates a session for a connection from `peer`.
    pub fn new(engine: Arc<StorageEngine>, peer: impl Into<String>) -> Self {
        Self {
            engine,
            peer: peer.into(),
        }
    }

    /// Runs the dispatch loop until the stream ends or a terminal framing
    /// error occurs. All failures are logged here; none of them bring down
    /// the server.
    pub async fn run<S>(self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FrameReader::new(read_half);
        // The response codec shares the connection's write half; its gzip
        // stream is established lazily, on the first write, and reused for
        // every response on this connection.
        let mut writer = FrameWriter::new(write_half);
        let mut responded = false;

        debug!(peer = %self.peer, "session started");

        loop {
            let envelope = match reader.read_envelope().await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => {
                    debug!(peer = %self.peer, "stream ended, closing session");
                    break;
                }
                Err(FrameError::Decode(e)) => {
                    warn!(peer = %self.peer, error = %e, "malformed envelope, skipping frame");
                    continue;
                }
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "framing error, closing session");
                    break;
                }
            };

            debug!(
                peer = %self.peer,
                command = %envelope.command,
                object = %envelope.object_name(),
                "dispatching command"
            );

            match envelope.command {
                Command::Store => {
                    if !self.handle_store(&mut reader, &envelope).await {
                        break;
                    }
                }
                Command::Fetch => {
                    if self.handle_fetch(&mut writer, &envelope).await {
                        responded = true;
                    }
                }
                Command::Delete => self.handle_delete(&envelope).await,
                Command::Download | Command::Unknown(_) => {
                    warn!(
                        peer = %self.peer,
                        command = %envelope.command,
                        "invalid command, ignoring"
                    );
                }
            }
        }

        if responded {
            if let Err(e) = writer.shutdown().await {
                warn!(peer = %self.peer, error = %e, "failed to finish response stream");
            }
        }
    }

    /// Reads the payload frame and hands it to the storage engine.
    ///
    /// Returns `false` when the session must terminate (payload framing
    /// error); a failed store keeps the session alive.
    async fn handle_store<R>(&self, reader: &mut FrameReader<R>, envelope: &Envelope) -> bool
    where
        R: AsyncRead + Unpin,
    {
        let payload = match reader.read_frame().await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                warn!(peer = %self.peer, "stream ended before store payload");
                return false;
            }
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "failed to read store payload");
                return false;
            }
        };

        match self.engine.store(envelope, &mut payload.as_ref()).await {
            Ok(bytes) => {
                info!(
                    peer = %self.peer,
                    object = %envelope.object_name(),
                    bytes,
                    "store complete"
                );
            }
            Err(e) => {
                warn!(peer = %self.peer, object = %envelope.object_name(), error = %e, "store failed");
            }
        }
        true
    }

    /// Serves the object back as a `download` envelope plus payload frame.
    ///
    /// Returns `true` if a response went out on the write codec. An absent or
    /// unreadable object is logged without a response.
    async fn handle_fetch<W>(&self, writer: &mut FrameWriter<W>, envelope: &Envelope) -> bool
    where
        W: AsyncWrite + Unpin,
    {
        let mut file = match self.engine.read(envelope).await {
            Ok(file) => file,
            Err(e) => {
                warn!(peer = %self.peer, object = %envelope.object_name(), error = %e, "fetch failed");
                return false;
            }
        };

        let response = envelope.with_command(Command::Download);
        let sent = async {
            writer.send_envelope(&response).await?;
            let bytes = writer.send_stream_framed(&mut file).await?;
            writer.flush().await?;
            Ok::<u64, FrameError>(bytes)
        }
        .await;

        match sent {
            Ok(bytes) => {
                info!(
                    peer = %self.peer,
                    object = %envelope.object_name(),
                    bytes,
                    "fetch served"
                );
                true
            }
            Err(e) => {
                warn!(peer = %self.peer, object = %envelope.object_name(), error = %e, "failed to send fetch response");
                true
            }
        }
    }

    async fn handle_delete(&self, envelope: &Envelope) {
        match self.engine.delete(envelope).await {
            Ok(()) => {
                info!(peer = %self.peer, object = %envelope.object_name(), "delete complete");
            }
            Err(e) => {
                warn!(peer = %self.peer, object = %envelope.object_name(), error = %e, "delete failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_store::StoreConfig;
    use tempfile::TempDir;

    async fn test_engine(dir: &TempDir) -> Arc<StorageEngine> {
        Arc::new(
            StorageEngine::open(StoreConfig::new(dir.path()))
                .await
                .unwrap(),
        )
    }

    fn envelope(command: Command) -> Envelope {
        Envelope::new("1", "a", "txt", command, "test-client")
    }

    #[tokio::test]
    async fn test_store_then_fetch_roundtrip() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir).await;

        let (client, server) = tokio::io::duplex(64 * 1024);
        let session = tokio::spawn(Session::new(engine, "test").run(server));

        let (client_read, client_write) = tokio::io::split(client);
        let mut writer = FrameWriter::new(client_write);
        writer.send_envelope(&envelope(Command::Store)).await.unwrap();
        writer.send_framed(b"hello").await.unwrap();
        writer.send_envelope(&envelope(Command::Fetch)).await.unwrap();
        writer.shutdown().await.unwrap();

        let mut reader = FrameReader::new(client_read);
        let response = reader.read_envelope().await.unwrap().unwrap();
        assert_eq!(response.command, Command::Download);
        assert_eq!(response.id, "1");

        let payload = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(&payload[..], b"hello");

        session.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_command_is_non_fatal() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir).await;

        let (client, server) = tokio::io::duplex(64 * 1024);
        let session = tokio::spawn(Session::new(engine.clone(), "test").run(server));

        let (_client_read, client_write) = tokio::io::split(client);
        let mut writer = FrameWriter::new(client_write);
        writer
            .send_envelope(&Envelope::new("1", "a", "txt", Command::from("bogus"), "c"))
            .await
            .unwrap();
        // The session must still process this store after the bogus command.
        writer.send_envelope(&envelope(Command::Store)).await.unwrap();
        writer.send_framed(b"still alive").await.unwrap();
        writer.shutdown().await.unwrap();

        session.await.unwrap();

        let mut file = engine.read(&envelope(Command::Fetch)).await.unwrap();
        let mut contents = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut file, &mut contents)
            .await
            .unwrap();
        assert_eq!(contents, "still alive");
    }

    #[tokio::test]
    async fn test_malformed_envelope_skipped() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir).await;

        let (client, server) = tokio::io::duplex(64 * 1024);
        let session = tokio::spawn(Session::new(engine.clone(), "test").run(server));

        let (_client_read, client_write) = tokio::io::split(client);
        let mut writer = FrameWriter::new(client_write);
        writer.send_framed(b"definitely not json").await.unwrap();
        writer.send_envelope(&envelope(Command::Store)).await.unwrap();
        writer.send_framed(b"payload").await.unwrap();
        writer.shutdown().await.unwrap();

        session.await.unwrap();
        assert!(engine.read(&envelope(Command::Fetch)).await.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_missing_sends_no_response() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir).await;

        let (client, server) = tokio::io::duplex(64 * 1024);
        let session = tokio::spawn(Session::new(engine, "test").run(server));

        let (client_read, client_write) = tokio::io::split(client);
        let mut writer = FrameWriter::new(client_write);
        writer.send_envelope(&envelope(Command::Fetch)).await.unwrap();
        writer.shutdown().await.unwrap();

        session.await.unwrap();

        // The session terminated without responding; the raw stream carries
        // no bytes for us.
        let mut raw = client_read;
        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut raw, &mut buf)
            .await
            .unwrap();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_object() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir).await;
        engine
            .store(&envelope(Command::Store), &mut &b"data"[..])
            .await
            .unwrap();

        let (client, server) = tokio::io::duplex(64 * 1024);
        let session = tokio::spawn(Session::new(engine.clone(), "test").run(server));

        let (_client_read, client_write) = tokio::io::split(client);
        let mut writer = FrameWriter::new(client_write);
        writer.send_envelope(&envelope(Command::Delete)).await.unwrap();
        writer.shutdown().await.unwrap();

        session.await.unwrap();
        assert!(engine.read(&envelope(Command::Fetch)).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_stream_terminates_session() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir).await;

        let (client, server) = tokio::io::duplex(64 * 1024);
        let session = tokio::spawn(Session::new(engine, "test").run(server));

        // Envelope promising a payload, then the stream ends.
        let (_client_read, client_write) = tokio::io::split(client);
        let mut writer = FrameWriter::new(client_write);
        writer.send_envelope(&envelope(Command::Store)).await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);
        drop(_client_read);

        // Terminates instead of hanging.
        session.await.unwrap();
    }
}
