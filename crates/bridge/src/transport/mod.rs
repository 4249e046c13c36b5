//! Message transport between the bridge and the external runtime.
//!
//! This module implements the framed channel both simulators talk over. It provides:
//! 1. **Messages:** The closed [`Command`] set and the [`Message`] unit of exchange.
//! 2. **Framing:** `[u32 LE tag][u32 LE length][payload]` encoding and blocking decode.
//! 3. **Sockets:** Named rendezvous points ([`Listener`]) and connections ([`Connection`]) over Unix domain sockets.
//! 4. **Seam:** The [`Exchange`] trait the scheduler is generic over.
//!
//! All operations block the calling thread. Nothing is buffered across calls
//! beyond the bytes of the frame currently being reassembled.

use std::time::Duration;

/// Transport error type.
pub mod error;

/// Frame encoding and decoding.
pub mod frame;

/// Commands and messages.
pub mod message;

/// Unix domain socket rendezvous points and connections.
pub mod socket;

pub use error::TransportError;
pub use message::{Command, Message};
pub use socket::{Connection, Listener, PeerId, socket_path};

/// A bidirectional message channel.
///
/// Implemented by [`Connection`]; the scheduler only depends on this trait so
/// it can be driven over any channel that preserves message boundaries.
pub trait Exchange {
    /// Sends one message.
    fn send(&mut self, message: &Message) -> Result<(), TransportError>;

    /// Receives one message, waiting at most `timeout` (`None` waits forever).
    fn receive(&mut self, timeout: Option<Duration>) -> Result<Message, TransportError>;
}

impl Exchange for Connection {
    fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        Self::send(self, message)
    }

    fn receive(&mut self, timeout: Option<Duration>) -> Result<Message, TransportError> {
        Self::receive(self, timeout)
    }
}
