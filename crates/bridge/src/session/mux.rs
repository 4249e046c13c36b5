//! Session multiplexer.
//!
//! One shared rendezvous where simulator instances register their session
//! names and external clients register their identities. A route table maps
//! each client identity to the server name it talks to; when both halves of a
//! route are present both receive `PAIRED` and the multiplexer relays bytes
//! between them on two threads, one per direction.
//!
//! Registrations are independent: a rejected, silent or disconnected
//! registrant never affects other pairs. Each accepted connection reads its
//! registration on its own thread, so the accept loop never waits on one.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::SessionError;
use crate::common::constants::DEFAULT_MAX_PAYLOAD;
use crate::config::{BridgeConfig, MuxConfig};
use crate::transport::{Command, Connection, Listener, Message, PeerId, TransportError};

/// A matched client and server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pairing {
    /// Client identity.
    pub client_id: String,
    /// Server session name.
    pub server: String,
}

/// What [`Multiplexer::serve`] did.
#[derive(Debug, Default)]
pub struct MuxSummary {
    /// Pairs formed, in order.
    pub pairings: Vec<Pairing>,
    /// Registrations that failed; each affected only its own registrant.
    pub errors: Vec<SessionError>,
}

/// Rendezvous service pairing simulator instances with external clients.
#[derive(Debug)]
pub struct Multiplexer {
    listener: Listener,
    routes: BTreeMap<String, String>,
    registration_timeout: Duration,
    poll_interval: Duration,
    pending_servers: HashMap<String, Connection>,
    pending_clients: HashMap<String, Connection>,
    paired_servers: BTreeSet<String>,
    paired_clients: BTreeSet<String>,
    pairings: Vec<Pairing>,
    relays: Vec<JoinHandle<()>>,
}

impl Multiplexer {
    /// Binds the multiplexer rendezvous `name` under `dir`.
    pub fn bind(dir: &Path, name: &str, config: &MuxConfig) -> Result<Self, SessionError> {
        Self::bind_with_limit(dir, name, config, DEFAULT_MAX_PAYLOAD)
    }

    /// Binds the multiplexer described by a full bridge configuration.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, SessionError> {
        Self::bind_with_limit(
            &config.session.socket_dir,
            &config.session.mux_name,
            &config.mux,
            config.transport.max_payload,
        )
    }

    fn bind_with_limit(
        dir: &Path,
        name: &str,
        config: &MuxConfig,
        max_payload: usize,
    ) -> Result<Self, SessionError> {
        let listener = Listener::bind_with_limit(dir, name, max_payload)?;
        info!(routes = config.routes.len(), "multiplexer listening");
        Ok(Self {
            listener,
            routes: config.routes.clone(),
            registration_timeout: config.registration_timeout(),
            poll_interval: config.poll_interval(),
            pending_servers: HashMap::new(),
            pending_clients: HashMap::new(),
            paired_servers: BTreeSet::new(),
            paired_clients: BTreeSet::new(),
            pairings: Vec::new(),
            relays: Vec::new(),
        })
    }

    /// Returns the socket path registrants connect to.
    pub fn path(&self) -> &Path {
        self.listener.path()
    }

    /// Returns the pairs formed so far.
    pub fn pairings(&self) -> &[Pairing] {
        &self.pairings
    }

    /// Returns the number of registrations still waiting for their counterpart.
    pub fn pending(&self) -> usize {
        self.pending_servers.len() + self.pending_clients.len()
    }

    /// Returns `true` once every routed client has been paired.
    pub fn is_complete(&self) -> bool {
        !self.routes.is_empty()
            && self
                .routes
                .keys()
                .all(|client| self.paired_clients.contains(client))
    }

    /// Reads the registration of a freshly accepted connection and acts on it.
    pub fn admit(
        &mut self,
        peer: PeerId,
        mut conn: Connection,
    ) -> Result<Option<Pairing>, SessionError> {
        let received = conn.receive(Some(self.registration_timeout));
        self.dispatch(peer, conn, received)
    }

    /// Acts on a registration read from `conn`.
    fn dispatch(
        &mut self,
        peer: PeerId,
        mut conn: Connection,
        received: Result<Message, TransportError>,
    ) -> Result<Option<Pairing>, SessionError> {
        let message = received?;
        let name = message.data_as_text();
        debug!(%peer, command = %message.command, %name, "registration received");
        match message.command {
            Command::RegisterServer => self.register(&name, conn),
            Command::RegisterClient => self.route(&name, conn),
            got => {
                reject(&mut conn, &format!("expected a registration, received {got}"));
                Err(SessionError::UnexpectedReply {
                    expected: Command::RegisterServer,
                    got,
                })
            }
        }
    }

    /// Registers a simulator session and pairs it if its client is waiting.
    pub fn register(
        &mut self,
        name: &str,
        mut conn: Connection,
    ) -> Result<Option<Pairing>, SessionError> {
        if self.pending_servers.contains_key(name) || self.paired_servers.contains(name) {
            reject(&mut conn, &format!("session '{name}' is already registered"));
            return Err(SessionError::DuplicateSession(name.to_string()));
        }
        let Some(client_id) = self
            .routes
            .iter()
            .find(|(_, server)| server.as_str() == name)
            .map(|(client, _)| client.clone())
        else {
            reject(&mut conn, &format!("no route leads to session '{name}'"));
            return Err(SessionError::UnmatchedSession {
                name: name.to_string(),
                reason: "no route leads to this session".to_string(),
            });
        };

        match self.pending_clients.remove(&client_id) {
            Some(client) => self.pair(&client_id, name, client, conn).map(Some),
            None => {
                info!(session = name, client = %client_id, "server waiting for its client");
                let _ = self.pending_servers.insert(name.to_string(), conn);
                Ok(None)
            }
        }
    }

    /// Registers an external client and pairs it if its server is waiting.
    pub fn route(
        &mut self,
        client_id: &str,
        mut conn: Connection,
    ) -> Result<Option<Pairing>, SessionError> {
        let Some(server) = self.routes.get(client_id).cloned() else {
            reject(&mut conn, &format!("no route for client '{client_id}'"));
            return Err(SessionError::UnknownClient(client_id.to_string()));
        };
        if self.pending_clients.contains_key(client_id) || self.paired_clients.contains(client_id)
        {
            reject(&mut conn, &format!("client '{client_id}' is already registered"));
            return Err(SessionError::DuplicateSession(client_id.to_string()));
        }

        match self.pending_servers.remove(&server) {
            Some(server_conn) => self.pair(client_id, &server, conn, server_conn).map(Some),
            None => {
                info!(client = client_id, session = %server, "client waiting for its server");
                let _ = self.pending_clients.insert(client_id.to_string(), conn);
                Ok(None)
            }
        }
    }

    /// Notifies both halves and starts relaying between them.
    fn pair(
        &mut self,
        client_id: &str,
        server: &str,
        mut client: Connection,
        mut server_conn: Connection,
    ) -> Result<Pairing, SessionError> {
        server_conn.send(&Message::text(Command::Paired, client_id))?;
        client.send(&Message::text(Command::Paired, server))?;

        let client = client.into_stream()?;
        let server_stream = server_conn.into_stream()?;
        let upstream = relay(
            format!("relay-{client_id}-up"),
            client.try_clone().map_err(TransportError::from)?,
            server_stream.try_clone().map_err(TransportError::from)?,
        )?;
        let downstream = relay(format!("relay-{client_id}-down"), server_stream, client)?;
        self.relays.extend([upstream, downstream]);

        let _ = self.paired_servers.insert(server.to_string());
        let _ = self.paired_clients.insert(client_id.to_string());
        let pairing = Pairing {
            client_id: client_id.to_string(),
            server: server.to_string(),
        };
        info!(client = client_id, session = server, "paired");
        self.pairings.push(pairing.clone());
        Ok(pairing)
    }

    /// Accepts registrations until every route is paired or `shutdown` is set.
    ///
    /// Pending registrations are abandoned on return; relays keep running
    /// until [`Multiplexer::join_relays`].
    pub fn serve(&mut self, shutdown: &AtomicBool) -> Result<MuxSummary, SessionError> {
        self.listener.set_nonblocking(true)?;
        let mut summary = MuxSummary::default();
        let (registered_tx, registered_rx) = mpsc::channel();

        while !shutdown.load(Ordering::Acquire) && !self.is_complete() {
            let mut idle = true;
            if let Some((peer, conn)) = self.listener.try_accept()? {
                idle = false;
                let timeout = self.registration_timeout;
                if let Err(e) = read_registration(peer, conn, timeout, registered_tx.clone()) {
                    warn!(%peer, error = %e, "could not start registration reader");
                    summary.errors.push(e);
                }
            }
            while let Ok((peer, conn, received)) = registered_rx.try_recv() {
                idle = false;
                match self.dispatch(peer, conn, received) {
                    Ok(Some(pairing)) => summary.pairings.push(pairing),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(%peer, error = %e, "registration failed");
                        summary.errors.push(e);
                    }
                }
            }
            if idle {
                summary.errors.extend(self.prune_disconnected());
                thread::sleep(self.poll_interval);
            }
        }

        summary.errors.extend(self.abandon_pending());
        info!(
            pairings = summary.pairings.len(),
            errors = summary.errors.len(),
            "multiplexer stopped accepting"
        );
        Ok(summary)
    }

    /// Drops pending registrations whose socket was closed by the registrant.
    pub fn prune_disconnected(&mut self) -> Vec<SessionError> {
        let mut errors = Vec::new();
        for (pending, reason) in [
            (&mut self.pending_clients, "client disconnected before its server registered"),
            (&mut self.pending_servers, "server disconnected before its client registered"),
        ] {
            let closed: Vec<String> = pending
                .iter()
                .filter(|(_, conn)| conn.peer_closed())
                .map(|(name, _)| name.clone())
                .collect();
            for name in closed {
                let _ = pending.remove(&name);
                warn!(%name, reason, "dropping registration");
                errors.push(SessionError::UnmatchedSession {
                    name,
                    reason: reason.to_string(),
                });
            }
        }
        errors
    }

    /// Closes every pending registration.
    pub fn abandon_pending(&mut self) -> Vec<SessionError> {
        self.pending_clients
            .drain()
            .chain(self.pending_servers.drain())
            .map(|(name, conn)| {
                let _ = conn.shutdown();
                warn!(%name, "registration abandoned at shutdown");
                SessionError::UnmatchedSession {
                    name,
                    reason: "multiplexer shut down before a match".to_string(),
                }
            })
            .collect()
    }

    /// Waits for every relay thread to finish.
    pub fn join_relays(&mut self) {
        for handle in self.relays.drain(..) {
            let name = handle.thread().name().unwrap_or("relay").to_string();
            if handle.join().is_err() {
                warn!(relay = %name, "relay thread panicked");
            }
        }
    }
}

type Registration = (PeerId, Connection, Result<Message, TransportError>);

/// Reads one registration on a detached thread and hands it back to the accept loop.
fn read_registration(
    peer: PeerId,
    mut conn: Connection,
    timeout: Duration,
    registered: Sender<Registration>,
) -> Result<(), SessionError> {
    let _ = thread::Builder::new()
        .name(format!("register-{}", peer.ordinal))
        .spawn(move || {
            let received = conn.receive(Some(timeout));
            if registered.send((peer, conn, received)).is_err() {
                debug!(%peer, "multiplexer stopped before the registration arrived");
            }
        })
        .map_err(|e| SessionError::Transport(TransportError::Io(e)))?;
    Ok(())
}

fn reject(conn: &mut Connection, reason: &str) {
    if let Err(e) = conn.send(&Message::text(Command::Rejected, reason)) {
        debug!(error = %e, "could not deliver rejection");
    }
}

/// Copies bytes from `from` to `to` until `from` closes, then shuts `to` down.
fn relay(
    name: String,
    mut from: UnixStream,
    mut to: UnixStream,
) -> Result<JoinHandle<()>, SessionError> {
    let label = name.clone();
    thread::Builder::new()
        .name(name)
        .spawn(move || {
            match io::copy(&mut from, &mut to) {
                Ok(bytes) => debug!(relay = %label, bytes, "relay finished"),
                Err(e) => debug!(relay = %label, error = %e, "relay ended with error"),
            }
            let _ = to.shutdown(Shutdown::Both);
            let _ = from.shutdown(Shutdown::Read);
        })
        .map_err(|e| SessionError::Transport(TransportError::Io(e)))
}
