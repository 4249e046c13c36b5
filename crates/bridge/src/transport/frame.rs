//! Frame encoding and decoding.
//!
//! # Wire Format
//!
//! * `0..4`: command tag, `u32` little-endian
//! * `4..8`: payload length, `u32` little-endian
//! * `8..`: payload bytes
//!
//! The payload length is checked against the receiver's limit before any
//! payload bytes are read, and the payload of a frame with an unknown tag is
//! still consumed so the stream stays aligned on frame boundaries.

use std::io::{self, Read, Write};

use super::{Command, Message, TransportError};
use crate::common::constants::FRAME_HEADER_LEN;

/// Decoded frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw command tag.
    pub tag: u32,
    /// Payload length in bytes.
    pub len: u32,
}

impl FrameHeader {
    /// Parses a header from its 8 wire bytes.
    pub const fn parse(bytes: [u8; FRAME_HEADER_LEN]) -> Self {
        Self {
            tag: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            len: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    /// Serializes the header to its 8 wire bytes.
    pub fn to_bytes(self) -> [u8; FRAME_HEADER_LEN] {
        let mut out = [0u8; FRAME_HEADER_LEN];
        out[..4].copy_from_slice(&self.tag.to_le_bytes());
        out[4..].copy_from_slice(&self.len.to_le_bytes());
        out
    }
}

/// Encodes a message into one contiguous frame.
pub fn encode(message: &Message) -> Result<Vec<u8>, TransportError> {
    let len = u32::try_from(message.data.len()).map_err(|_| TransportError::FrameTooLarge {
        len: message.data.len(),
        max: u32::MAX as usize,
    })?;
    let header = FrameHeader {
        tag: message.command.tag(),
        len,
    };
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + message.data.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(&message.data);
    Ok(frame)
}

/// Writes one frame with a single `write_all`.
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<(), TransportError> {
    let frame = encode(message)?;
    writer.write_all(&frame).map_err(map_io)?;
    writer.flush().map_err(map_io)
}

/// Reads one frame, blocking until it is complete.
///
/// Payloads longer than `max_payload` are rejected before being read.
pub fn read_message<R: Read>(reader: &mut R, max_payload: usize) -> Result<Message, TransportError> {
    let mut raw = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut raw).map_err(map_io)?;
    let header = FrameHeader::parse(raw);

    let len = header.len as usize;
    if len > max_payload {
        return Err(TransportError::FrameTooLarge {
            len,
            max: max_payload,
        });
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).map_err(map_io)?;
    let command = Command::try_from(header.tag)?;
    Ok(Message { command, data })
}

fn map_io(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => TransportError::Disconnected,
        _ => TransportError::Io(e),
    }
}
