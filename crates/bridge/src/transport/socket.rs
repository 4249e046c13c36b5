//! Unix domain socket rendezvous points and connections.
//!
//! A rendezvous name maps to the socket file `<dir>/<name>.sock`. Ownership of
//! the name is an exclusive `flock` on `<dir>/<name>.lock`, held for the
//! listener's lifetime. Binding a name whose lock is held fails without
//! touching the owner's socket; a socket file left behind by a dead process is
//! removed and rebound.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, trace};

use super::{Message, TransportError, frame};
use crate::common::constants::{DEFAULT_MAX_PAYLOAD, SOCKET_SUFFIX};

/// Smallest read timeout handed to the socket; a zero timeout is rejected by the OS.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Returns the socket path for rendezvous `name` under `dir`.
pub fn socket_path(dir: &Path, name: &str) -> Result<PathBuf, TransportError> {
    let usable = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\0']);
    if !usable {
        return Err(TransportError::InvalidName(name.to_string()));
    }
    Ok(dir.join(format!("{name}{SOCKET_SUFFIX}")))
}

/// Opaque identity of an accepted peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeerId {
    /// Peer process id, when the platform reports it.
    pub pid: Option<u32>,
    /// Position of this peer in the listener's accept order.
    pub ordinal: u64,
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "pid {pid} (#{})", self.ordinal),
            None => write!(f, "#{}", self.ordinal),
        }
    }
}

/// A named rendezvous point accepting [`Connection`]s.
///
/// The socket file is removed when the listener is dropped; the name lock is
/// released after it.
#[derive(Debug)]
pub struct Listener {
    name: String,
    path: PathBuf,
    inner: UnixListener,
    _lock: File,
    accepted: u64,
    max_payload: usize,
}

impl Listener {
    /// Binds rendezvous `name` under `dir` with the default payload limit.
    pub fn bind(dir: &Path, name: &str) -> Result<Self, TransportError> {
        Self::bind_with_limit(dir, name, DEFAULT_MAX_PAYLOAD)
    }

    /// Binds rendezvous `name` under `dir`; accepted connections reject
    /// payloads above `max_payload`.
    pub fn bind_with_limit(
        dir: &Path,
        name: &str,
        max_payload: usize,
    ) -> Result<Self, TransportError> {
        let path = socket_path(dir, name)?;
        let bind_error = |reason: String| TransportError::Bind {
            name: name.to_string(),
            path: path.clone(),
            reason,
        };

        fs::create_dir_all(dir).map_err(|e| bind_error(e.to_string()))?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path.with_extension("lock"))
            .map_err(|e| bind_error(e.to_string()))?;
        if !try_lock_exclusive(&lock).map_err(|e| bind_error(e.to_string()))? {
            return Err(bind_error("name is held by a live listener".to_string()));
        }

        // Holding the lock, any socket file left at the path is stale.
        if path.exists() {
            fs::remove_file(&path).map_err(|e| bind_error(e.to_string()))?;
            debug!(path = %path.display(), "removed stale rendezvous socket");
        }

        let inner = UnixListener::bind(&path).map_err(|e| bind_error(e.to_string()))?;
        info!(name, path = %path.display(), "rendezvous bound");
        Ok(Self {
            name: name.to_string(),
            path,
            inner,
            _lock: lock,
            accepted: 0,
            max_payload,
        })
    }

    /// Returns the rendezvous name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the socket path peers connect to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Switches between blocking and polling accepts.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<(), TransportError> {
        self.inner.set_nonblocking(nonblocking)?;
        Ok(())
    }

    /// Blocks until a peer connects.
    pub fn accept(&mut self) -> Result<(PeerId, Connection), TransportError> {
        let (stream, _) = self.inner.accept()?;
        self.admit(stream)
    }

    /// Accepts a pending peer without blocking; `None` if nobody is waiting.
    ///
    /// Only meaningful after [`Listener::set_nonblocking`]`(true)`.
    pub fn try_accept(&mut self) -> Result<Option<(PeerId, Connection)>, TransportError> {
        match self.inner.accept() {
            Ok((stream, _)) => self.admit(stream).map(Some),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn admit(&mut self, stream: UnixStream) -> Result<(PeerId, Connection), TransportError> {
        stream.set_nonblocking(false)?;
        let peer = PeerId {
            pid: peer_pid(&stream),
            ordinal: self.accepted,
        };
        self.accepted += 1;
        debug!(rendezvous = %self.name, %peer, "peer connected");
        Ok((peer, Connection::from_stream(stream, self.max_payload)))
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// An open, message-framed connection.
#[derive(Debug)]
pub struct Connection {
    stream: UnixStream,
    max_payload: usize,
    read_timeout: Option<Duration>,
}

impl Connection {
    /// Connects to the rendezvous socket at `path`.
    pub fn connect(path: &Path) -> Result<Self, TransportError> {
        Self::connect_with_limit(path, DEFAULT_MAX_PAYLOAD)
    }

    /// Connects to `path`, rejecting payloads above `max_payload`.
    pub fn connect_with_limit(path: &Path, max_payload: usize) -> Result<Self, TransportError> {
        let stream = UnixStream::connect(path)?;
        debug!(path = %path.display(), "connected");
        Ok(Self::from_stream(stream, max_payload))
    }

    /// Creates two connected endpoints in this process.
    pub fn pair() -> Result<(Self, Self), TransportError> {
        let (a, b) = UnixStream::pair()?;
        Ok((
            Self::from_stream(a, DEFAULT_MAX_PAYLOAD),
            Self::from_stream(b, DEFAULT_MAX_PAYLOAD),
        ))
    }

    pub(crate) const fn from_stream(stream: UnixStream, max_payload: usize) -> Self {
        Self {
            stream,
            max_payload,
            read_timeout: None,
        }
    }

    /// Sends one message; the frame is written in a single call.
    pub fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        frame::write_message(&mut self.stream, message)?;
        trace!(command = %message.command, len = message.len(), "sent");
        Ok(())
    }

    /// Receives one message.
    ///
    /// `None` blocks until a message or a disconnect arrives. A timeout that
    /// fires in the middle of a frame leaves the stream unaligned, so callers
    /// treat a steady-state timeout as fatal.
    pub fn receive(&mut self, timeout: Option<Duration>) -> Result<Message, TransportError> {
        let timeout = timeout.map(|t| t.max(MIN_READ_TIMEOUT));
        if self.read_timeout != timeout {
            self.stream.set_read_timeout(timeout)?;
            self.read_timeout = timeout;
        }

        match frame::read_message(&mut self.stream, self.max_payload) {
            Ok(message) => {
                trace!(command = %message.command, len = message.len(), "received");
                Ok(message)
            }
            Err(TransportError::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                Err(TransportError::Timeout(timeout.unwrap_or_default()))
            }
            Err(e) => Err(e),
        }
    }

    /// Sends `message` and waits for the reply.
    pub fn request(
        &mut self,
        message: &Message,
        timeout: Option<Duration>,
    ) -> Result<Message, TransportError> {
        self.send(message)?;
        self.receive(timeout)
    }

    /// Returns a second handle to the same socket.
    pub fn try_clone(&self) -> Result<Self, TransportError> {
        Ok(Self::from_stream(self.stream.try_clone()?, self.max_payload))
    }

    /// Shuts down both directions; the peer sees a disconnect.
    pub fn shutdown(&self) -> Result<(), TransportError> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Returns `true` if the peer has closed its end.
    ///
    /// Peeks without consuming data; a connection with unread data is open.
    pub fn peer_closed(&self) -> bool {
        peer_closed(&self.stream)
    }

    /// Returns the process id of the peer, when the platform reports it.
    pub fn peer_pid(&self) -> Option<u32> {
        peer_pid(&self.stream)
    }

    /// Unwraps the raw stream for byte relaying; the read timeout is cleared.
    pub(crate) fn into_stream(mut self) -> Result<UnixStream, TransportError> {
        self.stream.flush()?;
        self.stream.set_read_timeout(None)?;
        Ok(self.stream)
    }
}

#[cfg(target_os = "linux")]
fn peer_pid(stream: &UnixStream) -> Option<u32> {
    use std::os::fd::AsRawFd;

    let mut cred = libc::ucred {
        pid: 0,
        uid: 0,
        gid: 0,
    };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
    // SAFETY: `cred` and `len` are live locals sized for SO_PEERCRED, and the
    // descriptor stays owned by `stream` for the whole call.
    let rc = unsafe {
        libc::getsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            std::ptr::addr_of_mut!(cred).cast::<libc::c_void>(),
            &mut len,
        )
    };
    (rc == 0 && cred.pid > 0).then_some(cred.pid as u32)
}

/// Takes the exclusive name lock without blocking; `false` if another listener holds it.
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    use std::os::fd::AsRawFd;

    // SAFETY: the descriptor stays owned by `file` for the whole call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err)
    }
}

fn peer_closed(stream: &UnixStream) -> bool {
    use std::os::fd::AsRawFd;

    let mut peek = [0u8; 1];
    // SAFETY: `peek` is a live one-byte buffer and the descriptor stays owned
    // by `stream` for the whole call. MSG_PEEK leaves queued data in place.
    let rc = unsafe {
        libc::recv(
            stream.as_raw_fd(),
            peek.as_mut_ptr().cast::<libc::c_void>(),
            peek.len(),
            libc::MSG_PEEK | libc::MSG_DONTWAIT,
        )
    };
    match rc {
        0 => true,
        n if n > 0 => false,
        _ => io::Error::last_os_error().kind() != io::ErrorKind::WouldBlock,
    }
}

#[cfg(not(target_os = "linux"))]
fn peer_pid(_stream: &UnixStream) -> Option<u32> {
    None
}
