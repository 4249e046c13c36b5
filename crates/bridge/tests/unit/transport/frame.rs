//! # Frame Tests
//!
//! Framing is exercised against in-memory readers and writers so that partial
//! and malformed input can be fed precisely.

use std::io::Cursor;

use cosim_bridge::transport::frame::{self, FrameHeader};
use cosim_bridge::transport::{Command, Message, TransportError};
use pretty_assertions::assert_eq;

fn raw_frame(tag: u32, payload: &[u8]) -> Vec<u8> {
    let mut bytes = tag.to_le_bytes().to_vec();
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

#[test]
fn test_encode_layout() {
    let frame = frame::encode(&Message::compute_request(vec![0xAA, 0xBB, 0xCC])).unwrap();
    assert_eq!(frame, vec![1, 0, 0, 0, 3, 0, 0, 0, 0xAA, 0xBB, 0xCC]);
}

#[test]
fn test_header_parse() {
    let header = FrameHeader::parse([2, 0, 0, 0, 8, 0, 0, 0]);
    assert_eq!(header, FrameHeader { tag: 2, len: 8 });
    assert_eq!(header.to_bytes(), [2, 0, 0, 0, 8, 0, 0, 0]);
}

#[test]
fn test_read_write_through_buffer() {
    let mut wire = Vec::new();
    frame::write_message(&mut wire, &Message::init(32)).unwrap();
    frame::write_message(&mut wire, &Message::done()).unwrap();

    let mut reader = Cursor::new(wire);
    assert_eq!(frame::read_message(&mut reader, 64).unwrap(), Message::init(32));
    assert_eq!(frame::read_message(&mut reader, 64).unwrap(), Message::done());
}

#[test]
fn test_empty_payload() {
    let mut reader = Cursor::new(raw_frame(1, &[]));
    let msg = frame::read_message(&mut reader, 64).unwrap();
    assert_eq!(msg.command, Command::ComputeRequest);
    assert!(msg.is_empty());
}

#[test]
fn test_oversized_payload_rejected_before_read() {
    let mut reader = Cursor::new(raw_frame(1, &[0; 32]));
    let err = frame::read_message(&mut reader, 16).unwrap_err();
    assert!(matches!(err, TransportError::FrameTooLarge { len: 32, max: 16 }));
    assert_eq!(reader.position(), 8);
}

#[test]
fn test_unknown_tag_consumes_payload() {
    let mut wire = raw_frame(42, &[1, 2, 3]);
    wire.extend(raw_frame(3, &[]));
    let mut reader = Cursor::new(wire);

    assert!(matches!(
        frame::read_message(&mut reader, 64),
        Err(TransportError::UnknownCommand(42))
    ));
    assert_eq!(frame::read_message(&mut reader, 64).unwrap(), Message::done());
}

#[test]
fn test_truncated_header_is_disconnect() {
    let mut reader = Cursor::new(vec![1, 0, 0]);
    assert!(matches!(
        frame::read_message(&mut reader, 64),
        Err(TransportError::Disconnected)
    ));
}

#[test]
fn test_truncated_payload_is_disconnect() {
    let mut wire = raw_frame(1, &[9; 10]);
    wire.truncate(12);
    let mut reader = Cursor::new(wire);
    let err = frame::read_message(&mut reader, 64).unwrap_err();
    assert!(err.is_disconnect());
}
