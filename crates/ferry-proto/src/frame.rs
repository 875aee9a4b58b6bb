//! Length-prefixed framing primitives.
//!
//! A frame is a 4-byte little-endian `u32` length followed by exactly that
//! many bytes. Frames are the message boundary on a stream that may carry
//! arbitrarily many sequential commands, which is why a connection-per-request
//! model is not needed.

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum accepted frame length: 256 MiB.
///
/// Rejects absurd length prefixes before any allocation happens.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Errors from framing and envelope encoding.
#[derive(Debug, Error)]
pub enum FrameError {
    /// IO error on the underlying stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stream ended inside a frame
    #[error("truncated frame: expected {expected} bytes, stream ended after {read}")]
    Truncated {
        /// Bytes the frame declared or required.
        expected: usize,
        /// Bytes actually read before end of stream.
        read: usize,
    },

    /// Declared frame length exceeds [`MAX_FRAME_LEN`]
    #[error("frame length {0} exceeds maximum {MAX_FRAME_LEN}")]
    TooLarge(usize),

    /// Malformed envelope payload
    #[error("envelope decode error: {0}")]
    Decode(#[source] serde_json::Error),

    /// Envelope serialization failure
    #[error("envelope encode error: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Writes `data` as one frame: length prefix, then the bytes.
pub async fn write_frame<W>(writer: &mut W, data: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if data.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(data.len()));
    }
    let len = data.len() as u32;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(data).await?;
    Ok(())
}

/// Writes the full contents of `source` as one frame.
///
/// The source is buffered completely in memory to learn its length before the
/// prefix goes out. Acceptable for bounded payload sizes; a chunked scheme
/// would be required to lift that bound.
pub async fn write_stream_frame<W, R>(writer: &mut W, source: &mut R) -> Result<u64, FrameError>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    source.read_to_end(&mut buffer).await?;
    write_frame(writer, &buffer).await?;
    Ok(buffer.len() as u64)
}

/// Reads one frame from `reader`.
///
/// Returns `Ok(None)` only when the stream ends cleanly at a frame boundary,
/// i.e. zero bytes were read for the length prefix. End of stream anywhere
/// inside the prefix or the payload is [`FrameError::Truncated`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Bytes>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FrameError::Truncated {
                expected: prefix.len(),
                read: filled,
            });
        }
        filled += n;
    }

    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }

    let mut data = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = reader.read(&mut data[filled..]).await?;
        if n == 0 {
            return Err(FrameError::Truncated {
                expected: len,
                read: filled,
            });
        }
        filled += n;
    }
    Ok(Some(Bytes::from(data)))
}
