//! Commands and messages.
//!
//! A [`Message`] pairs a [`Command`] tag with an opaque payload. The payload is
//! only interpreted by whoever consumes the command:
//!
//! * `INIT`: one little-endian `i32`, the run-ahead window in milliseconds.
//! * `COMPUTE_REQUEST`: bytes forwarded verbatim into the device input buffer.
//! * `COMPUTE_RESPONSE`: device output, or an all-zero placeholder.
//! * `DONE`: empty.
//! * Registration commands: a UTF-8 name or diagnostic.

use std::fmt;

use super::TransportError;

/// Command tag of a [`Message`].
///
/// Tags below 16 are exchanged between a simulator instance and the external
/// runtime; tags from 16 up are only used while registering with the
/// multiplexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    /// Handshake carrying the run-ahead window length.
    Init = 0,
    /// Input for the device; raises the device interrupt.
    ComputeRequest = 1,
    /// Result (or placeholder) sent back after every request.
    ComputeResponse = 2,
    /// Session termination.
    Done = 3,
    /// A simulator instance registers its session name with the multiplexer.
    RegisterServer = 16,
    /// An external client registers its identity with the multiplexer.
    RegisterClient = 17,
    /// The multiplexer matched the registrant; payload is the peer's name.
    Paired = 18,
    /// The multiplexer refused the registration; payload is a diagnostic.
    Rejected = 19,
}

impl Command {
    /// Returns the wire tag.
    pub const fn tag(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Command {
    type Error = TransportError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::Init),
            1 => Ok(Self::ComputeRequest),
            2 => Ok(Self::ComputeResponse),
            3 => Ok(Self::Done),
            16 => Ok(Self::RegisterServer),
            17 => Ok(Self::RegisterClient),
            18 => Ok(Self::Paired),
            19 => Ok(Self::Rejected),
            other => Err(TransportError::UnknownCommand(other)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::ComputeRequest => "COMPUTE_REQUEST",
            Self::ComputeResponse => "COMPUTE_RESPONSE",
            Self::Done => "DONE",
            Self::RegisterServer => "REGISTER_SERVER",
            Self::RegisterClient => "REGISTER_CLIENT",
            Self::Paired => "PAIRED",
            Self::Rejected => "REJECTED",
        };
        f.write_str(name)
    }
}

/// Unit of exchange between a simulator instance and the external runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// What the payload means.
    pub command: Command,
    /// Opaque payload.
    pub data: Vec<u8>,
}

impl Message {
    /// Creates a message from a command and payload.
    pub fn new(command: Command, data: impl Into<Vec<u8>>) -> Self {
        Self {
            command,
            data: data.into(),
        }
    }

    /// Creates a message with an empty payload.
    pub const fn empty(command: Command) -> Self {
        Self {
            command,
            data: Vec::new(),
        }
    }

    /// Creates an `INIT` message for a window of `window_ms` milliseconds.
    pub fn init(window_ms: i32) -> Self {
        Self::new(Command::Init, window_ms.to_le_bytes())
    }

    /// Creates a `COMPUTE_REQUEST` carrying `data`.
    pub fn compute_request(data: impl Into<Vec<u8>>) -> Self {
        Self::new(Command::ComputeRequest, data)
    }

    /// Creates a `COMPUTE_RESPONSE` carrying `data`.
    pub fn compute_response(data: impl Into<Vec<u8>>) -> Self {
        Self::new(Command::ComputeResponse, data)
    }

    /// Creates a `DONE` message.
    pub const fn done() -> Self {
        Self::empty(Command::Done)
    }

    /// Creates a message whose payload is UTF-8 text.
    pub fn text(command: Command, text: &str) -> Self {
        Self::new(command, text.as_bytes())
    }

    /// Returns the payload as text, replacing invalid UTF-8.
    pub fn data_as_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
