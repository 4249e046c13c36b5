//! Transport errors.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The rendezvous point could not be created or is already taken.
    #[error("cannot bind rendezvous '{name}' at {}: {reason}", path.display())]
    Bind {
        /// Requested rendezvous name.
        name: String,
        /// Socket path derived from the name.
        path: PathBuf,
        /// Why binding failed.
        reason: String,
    },

    /// The rendezvous name cannot be turned into a socket file name.
    #[error("'{0}' is not a valid rendezvous name")]
    InvalidName(String),

    /// No message arrived within the caller's bound.
    #[error("no message within {0:?}")]
    Timeout(Duration),

    /// The peer closed the connection.
    #[error("peer closed the connection")]
    Disconnected,

    /// A frame announced more payload than the connection accepts.
    #[error("frame payload of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Announced or attempted payload length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// A frame carried a command tag outside the protocol.
    #[error("unknown command tag {0}")]
    UnknownCommand(u32),

    /// Any other socket failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Returns `true` for [`TransportError::Timeout`].
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns `true` if the error means the peer is gone.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Disconnected => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
