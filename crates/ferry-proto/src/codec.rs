//! Gzip stream codec.
//!
//! Each connection carries a single gzip stream established once per
//! direction; frames travel inside it. The write side buffers compressed
//! output, so [`FrameWriter::flush`] is a hard contract: until the encoder is
//! flushed (or shut down), the peer's decoder blocks waiting for bytes that
//! never arrive.

use async_compression::tokio::bufread::GzipDecoder;
use async_compression::tokio::write::GzipEncoder;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::envelope::Envelope;
use crate::frame::{read_frame, write_frame, write_stream_frame, FrameError};

/// Write side of the codec: gzip compression over a raw stream, with
/// length-prefixed frames inside.
pub struct FrameWriter<W: AsyncWrite + Unpin> {
    encoder: GzipEncoder<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wraps a raw writer in a fresh gzip stream.
    pub fn new(writer: W) -> Self {
        Self {
            encoder: GzipEncoder::new(writer),
        }
    }

    /// Sends an envelope as one frame.
    pub async fn send_envelope(&mut self, envelope: &Envelope) -> Result<(), FrameError> {
        let bytes = envelope.to_bytes()?;
        write_frame(&mut self.encoder, &bytes).await
    }

    /// Sends raw bytes as one frame.
    pub async fn send_framed(&mut self, data: &[u8]) -> Result<(), FrameError> {
        write_frame(&mut self.encoder, data).await
    }

    /// Sends the full contents of `source` as one frame, returning the
    /// payload length in bytes.
    pub async fn send_stream_framed<R>(&mut self, source: &mut R) -> Result<u64, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        write_stream_frame(&mut self.encoder, source).await
    }

    /// Forces all buffered compressed bytes through to the peer.
    ///
    /// Must be called after a logical message when the stream stays open;
    /// otherwise the peer's reads block indefinitely.
    pub async fn flush(&mut self) -> Result<(), FrameError> {
        self.encoder.flush().await?;
        Ok(())
    }

    /// Finishes the gzip stream and flushes the raw writer.
    ///
    /// No further frames may be sent afterwards.
    pub async fn shutdown(&mut self) -> Result<(), FrameError> {
        self.encoder.shutdown().await?;
        Ok(())
    }
}

/// Read side of the codec: gzip decompression over a raw stream.
///
/// Construction is lazy; a bad or missing gzip header surfaces as an IO error
/// from the first read.
pub struct FrameReader<R: AsyncRead + Unpin> {
    decoder: GzipDecoder<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wraps a raw reader expected to carry a gzip stream.
    pub fn new(reader: R) -> Self {
        Self {
            decoder: GzipDecoder::new(BufReader::new(reader)),
        }
    }

    /// Reads one frame; `Ok(None)` means the stream ended cleanly at a
    /// frame boundary.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        read_frame(&mut self.decoder).await
    }

    /// Reads one frame and decodes it as an envelope.
    ///
    /// A malformed payload is a [`FrameError::Decode`], distinct from stream
    /// errors, so the caller can skip the frame and keep the session alive.
    pub async fn read_envelope(&mut self) -> Result<Option<Envelope>, FrameError> {
        match self.read_frame().await? {
            Some(bytes) => Envelope::from_bytes(&bytes).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Command;

    #[tokio::test]
    async fn test_codec_roundtrip_after_flush() {
        let (client, server) = tokio::io::duplex(64 * 1024);

        let mut writer = FrameWriter::new(client);
        let envelope = Envelope::new("1", "a", "txt", Command::Store, "node-1");
        writer.send_envelope(&envelope).await.unwrap();
        writer.send_framed(b"hello").await.unwrap();
        writer.flush().await.unwrap();

        let mut reader = FrameReader::new(server);
        let received = reader.read_envelope().await.unwrap().unwrap();
        assert_eq!(received, envelope);
        let payload = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(&payload[..], b"hello");
    }

    #[tokio::test]
    async fn test_codec_clean_end_after_shutdown() {
        let (client, server) = tokio::io::duplex(64 * 1024);

        let mut writer = FrameWriter::new(client);
        writer.send_framed(b"only frame").await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);

        let mut reader = FrameReader::new(server);
        assert_eq!(&reader.read_frame().await.unwrap().unwrap()[..], b"only frame");
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_codec_stream_frame() {
        let (client, server) = tokio::io::duplex(64 * 1024);

        let payload = vec![0xA5u8; 32 * 1024];
        let mut writer = FrameWriter::new(client);
        let mut source = payload.as_slice();
        let written = writer.send_stream_framed(&mut source).await.unwrap();
        assert_eq!(written, payload.len() as u64);
        writer.shutdown().await.unwrap();

        let mut reader = FrameReader::new(server);
        let frame = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(&frame[..], &payload[..]);
    }

    #[tokio::test]
    async fn test_codec_rejects_garbage_header() {
        let (mut client, server) = tokio::io::duplex(1024);
        client.write_all(b"not a gzip stream").await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        let mut reader = FrameReader::new(server);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_codec_malformed_envelope_is_decode_error() {
        let (client, server) = tokio::io::duplex(1024);

        let mut writer = FrameWriter::new(client);
        writer.send_framed(b"{ not json").await.unwrap();
        writer.flush().await.unwrap();

        let mut reader = FrameReader::new(server);
        assert!(matches!(
            reader.read_envelope().await,
            Err(FrameError::Decode(_))
        ));
    }
}
