//! Session establishment.
//!
//! This module pairs a simulator instance with its external peer. It provides:
//! 1. **Direct sessions:** A simulator listens on its own rendezvous name and accepts one peer.
//! 2. **Routed sessions:** Simulators and clients register with the [`Multiplexer`], which pairs them by route.
//! 3. **Client side:** [`ClientSession`], the external runtime's end of a session.
//!
//! After pairing, a routed connection carries the same framed traffic as a
//! direct one; the multiplexer relays bytes without inspecting them.

use std::fmt;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::common::constants::DEFAULT_MAX_PAYLOAD;
use crate::transport::{Command, Connection, Listener, Message, PeerId, TransportError, socket_path};

/// Session multiplexer.
pub mod mux;

pub use mux::{Multiplexer, MuxSummary, Pairing};

/// Errors raised while establishing sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The name is already registered or paired.
    #[error("session '{0}' is already registered")]
    DuplicateSession(String),

    /// A registration could not be matched with its counterpart.
    #[error("session '{name}' was never matched: {reason}")]
    UnmatchedSession {
        /// Server name or client identity.
        name: String,
        /// Why the match failed.
        reason: String,
    },

    /// No route exists for the client identity.
    #[error("no route for client '{0}'")]
    UnknownClient(String),

    /// The multiplexer refused the registration.
    #[error("registration rejected: {0}")]
    Rejected(String),

    /// The peer answered with the wrong command.
    #[error("expected {expected}, received {got}")]
    UnexpectedReply {
        /// Command that was expected.
        expected: Command,
        /// Command that arrived.
        got: Command,
    },

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Who is on the other end of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Peer {
    /// A peer accepted on the session's own rendezvous.
    Direct(PeerId),
    /// A client paired by the multiplexer.
    Routed {
        /// Identity the client registered with.
        client_id: String,
    },
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(id) => write!(f, "direct peer {id}"),
            Self::Routed { client_id } => write!(f, "client '{client_id}'"),
        }
    }
}

/// The simulator's end of an established session.
#[derive(Debug)]
pub struct Session {
    name: String,
    peer: Peer,
    connection: Connection,
}

impl Session {
    /// Binds rendezvous `name` under `dir` and accepts one peer.
    pub fn listen(dir: &Path, name: &str) -> Result<Self, SessionError> {
        Self::listen_with_limit(dir, name, DEFAULT_MAX_PAYLOAD)
    }

    /// Like [`Session::listen`], rejecting payloads above `max_payload`.
    pub fn listen_with_limit(
        dir: &Path,
        name: &str,
        max_payload: usize,
    ) -> Result<Self, SessionError> {
        let mut listener = Listener::bind_with_limit(dir, name, max_payload)?;
        let (peer, connection) = listener.accept()?;
        info!(session = name, %peer, "direct session established");
        Ok(Self {
            name: name.to_string(),
            peer: Peer::Direct(peer),
            connection,
        })
    }

    /// Registers `name` with the multiplexer at `mux_path` and blocks until paired.
    pub fn register(mux_path: &Path, name: &str) -> Result<Self, SessionError> {
        Self::register_with_limit(mux_path, name, DEFAULT_MAX_PAYLOAD)
    }

    /// Like [`Session::register`], rejecting payloads above `max_payload`.
    pub fn register_with_limit(
        mux_path: &Path,
        name: &str,
        max_payload: usize,
    ) -> Result<Self, SessionError> {
        let mut connection = Connection::connect_with_limit(mux_path, max_payload)?;
        let client_id = await_pairing(
            &mut connection,
            &Message::text(Command::RegisterServer, name),
        )?;
        info!(session = name, client = %client_id, "routed session established");
        Ok(Self {
            name: name.to_string(),
            peer: Peer::Routed { client_id },
            connection,
        })
    }

    /// Returns the session name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the peer identity.
    pub const fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Returns the connection.
    pub const fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    /// Consumes the session, returning its connection.
    pub fn into_connection(self) -> Connection {
        self.connection
    }
}

/// Sends a registration and waits for the multiplexer's verdict.
fn await_pairing(
    connection: &mut Connection,
    registration: &Message,
) -> Result<String, SessionError> {
    let reply = connection.request(registration, None)?;
    match reply.command {
        Command::Paired => Ok(reply.data_as_text()),
        Command::Rejected => Err(SessionError::Rejected(reply.data_as_text())),
        got => Err(SessionError::UnexpectedReply {
            expected: Command::Paired,
            got,
        }),
    }
}

/// The external runtime's end of a session.
#[derive(Debug)]
pub struct ClientSession {
    server: String,
    connection: Connection,
}

impl ClientSession {
    /// Registers `client_id` with the multiplexer at `mux_path` and blocks until paired.
    pub fn connect(mux_path: &Path, client_id: &str) -> Result<Self, SessionError> {
        let mut connection = Connection::connect(mux_path)?;
        let server = await_pairing(
            &mut connection,
            &Message::text(Command::RegisterClient, client_id),
        )?;
        info!(client = client_id, %server, "paired with simulator");
        Ok(Self { server, connection })
    }

    /// Connects straight to the simulator listening as `name` under `dir`.
    pub fn connect_direct(dir: &Path, name: &str) -> Result<Self, SessionError> {
        let connection = Connection::connect(&socket_path(dir, name)?)?;
        Ok(Self {
            server: name.to_string(),
            connection,
        })
    }

    /// Returns the name of the simulator instance on the other end.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Sends `INIT` with the run-ahead window in milliseconds.
    pub fn init(&mut self, window_ms: i32) -> Result<(), SessionError> {
        self.connection.send(&Message::init(window_ms))?;
        Ok(())
    }

    /// Sends one request and waits for its response.
    ///
    /// Returns `None` when the simulator ended the session with `DONE`.
    pub fn exchange(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>, SessionError> {
        let reply = self
            .connection
            .request(&Message::compute_request(data), None)?;
        match reply.command {
            Command::ComputeResponse => Ok(Some(reply.data)),
            Command::Done => Ok(None),
            got => Err(SessionError::UnexpectedReply {
                expected: Command::ComputeResponse,
                got,
            }),
        }
    }

    /// Ends the session with `DONE`.
    pub fn finish(mut self) -> Result<(), SessionError> {
        self.connection.send(&Message::done())?;
        Ok(())
    }

    /// Returns the connection for raw message traffic.
    pub const fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }
}
