//! Ferry Protocol - Wire protocol and framing for the ferry file transfer service.
//!
//! This crate defines:
//! - The command envelope exchanged as the first frame of every message
//! - Length-prefixed framing primitives over async byte streams
//! - The gzip stream codec wrapping each connection

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod codec;
pub mod envelope;
pub mod frame;

pub use codec::{FrameReader, FrameWriter};
pub use envelope::{Command, Envelope};
pub use frame::{read_frame, write_frame, write_stream_frame, FrameError, MAX_FRAME_LEN};
