//! Session-level errors.
//!
//! A [`BridgeError`] ends the scheduler loop of one session. Every variant
//! names the session so that a multi-instance deployment can tell which
//! simulator instance stopped, and transport and device failures also record
//! the [`Phase`] they happened in.

use std::fmt;

use thiserror::Error;

use crate::sim::SimError;
use crate::soc::devices::DeviceError;
use crate::transport::TransportError;

/// Phase of a session in which a failure occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Waiting for or decoding the `INIT` message.
    Handshake,
    /// The run-ahead exchange loop.
    SteadyState,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handshake => write!(f, "handshake"),
            Self::SteadyState => write!(f, "steady-state"),
        }
    }
}

/// Fatal error of one bridge session.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The transport failed (disconnect, timeout, framing).
    #[error("session '{session}': transport failure during {phase}: {source}")]
    Transport {
        /// Session name.
        session: String,
        /// Phase in which the failure happened.
        phase: Phase,
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },

    /// An `INIT` was missing or unusable.
    #[error("session '{session}': INIT rejected during {phase}: {reason}")]
    Handshake {
        /// Session name.
        session: String,
        /// Phase in which the message arrived.
        phase: Phase,
        /// What was wrong with the message.
        reason: String,
    },

    /// The requested run-ahead window cannot be used.
    #[error("session '{session}': invalid run-ahead window of {millis} ms during {phase}")]
    InvalidWindow {
        /// Session name.
        session: String,
        /// Phase in which the window was requested.
        phase: Phase,
        /// Window length as sent by the external runtime.
        millis: i64,
    },

    /// A device state-machine precondition was violated.
    #[error("session '{session}': device contract violated during {phase}: {source}")]
    Device {
        /// Session name.
        session: String,
        /// Phase in which the violation happened.
        phase: Phase,
        /// Underlying device error.
        #[source]
        source: DeviceError,
    },

    /// The hardware simulator could not advance.
    #[error("session '{session}': simulator failed: {source}")]
    Simulator {
        /// Session name.
        session: String,
        /// Underlying simulator error.
        #[source]
        source: SimError,
    },
}

impl BridgeError {
    /// Returns the name of the session that failed.
    pub fn session(&self) -> &str {
        match self {
            Self::Transport { session, .. }
            | Self::Handshake { session, .. }
            | Self::InvalidWindow { session, .. }
            | Self::Device { session, .. }
            | Self::Simulator { session, .. } => session,
        }
    }

    /// Returns the phase the failure belongs to.
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Transport { phase, .. }
            | Self::Handshake { phase, .. }
            | Self::InvalidWindow { phase, .. }
            | Self::Device { phase, .. } => *phase,
            Self::Simulator { .. } => Phase::SteadyState,
        }
    }

    /// Returns `true` if the failure was a receive timeout.
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                source: TransportError::Timeout(_),
                ..
            }
        )
    }
}
