//! Accept loop handing client connections to the session handler.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use osmp_config::SocketEndpoint;

use super::connections::OpenSessions;
use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::Path;

const IDLE_POLL: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

#[derive(Debug)]
enum BoundSocket {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl BoundSocket {
    fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Self::Unix(_) => None,
        }
    }

    fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            Self::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            Self::Unix(listener) => listener.set_nonblocking(true),
        }
    }

    /// Accepts one pending connection; `None` when nobody is waiting.
    fn accept(&self) -> io::Result<Option<ConnectionStream>> {
        let accepted = match self {
            Self::Tcp(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Tcp(stream))
            }),
            #[cfg(unix)]
            Self::Unix(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Unix(stream))
            }),
        };
        match accepted {
            Ok(stream) => Ok(Some(stream)),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// A bound endpoint that has not started accepting yet.
///
/// A Unix socket file created by [`SocketListener::bind`] is removed when
/// the listener drops.
#[derive(Debug)]
pub(crate) struct SocketListener {
    endpoint: SocketEndpoint,
    socket: BoundSocket,
}

impl SocketListener {
    /// Binds `endpoint`, reclaiming a Unix socket file nobody serves.
    pub(crate) fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let socket = match endpoint {
            SocketEndpoint::Tcp { host, port } => BoundSocket::Tcp(bind_tcp(host, *port)?),
            #[cfg(unix)]
            SocketEndpoint::Unix { path } => BoundSocket::Unix(bind_unix(path.as_std_path())?),
            #[cfg(not(unix))]
            SocketEndpoint::Unix { .. } => {
                return Err(ListenerError::UnsupportedUnix {
                    endpoint: endpoint.to_string(),
                });
            }
        };
        Ok(Self {
            endpoint: endpoint.clone(),
            socket,
        })
    }

    /// Bound TCP address; `None` for Unix sockets.
    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr()
    }

    /// Starts accepting on a background thread.
    ///
    /// Every accepted connection is served by `handler` on its own thread and
    /// stays registered until the handler returns, so
    /// [`ListenerHandle::stop`] can close it.
    pub(crate) fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        self.socket
            .set_nonblocking()
            .map_err(|source| ListenerError::NonBlocking { source })?;
        let stopping = Arc::new(AtomicBool::new(false));
        let sessions = OpenSessions::new();
        let local_addr = self.local_addr();
        let accept_loop = AcceptLoop {
            listener: self,
            stopping: Arc::clone(&stopping),
            sessions: Arc::clone(&sessions),
            handler,
        };
        let thread = thread::Builder::new()
            .name("osmp-listener".to_owned())
            .spawn(move || accept_loop.run())
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            stopping,
            sessions,
            local_addr,
            thread: Some(thread),
        })
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        #[cfg(unix)]
        remove_socket_file(&self.endpoint);
    }
}

struct AcceptLoop {
    listener: SocketListener,
    stopping: Arc<AtomicBool>,
    sessions: Arc<OpenSessions>,
    handler: Arc<dyn ConnectionHandler>,
}

impl AcceptLoop {
    fn run(self) {
        info!(
            target: LISTENER_TARGET,
            endpoint = %self.listener.endpoint,
            "accepting sessions"
        );
        let mut last_error = None::<io::ErrorKind>;
        while !self.stopping.load(Ordering::SeqCst) {
            match self.listener.socket.accept() {
                Ok(Some(stream)) => {
                    last_error = None;
                    self.serve(stream);
                }
                Ok(None) => thread::sleep(IDLE_POLL),
                Err(error) => {
                    if last_error != Some(error.kind()) {
                        warn!(target: LISTENER_TARGET, %error, "socket accept error");
                    }
                    last_error = Some(error.kind());
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
        info!(
            target: LISTENER_TARGET,
            endpoint = %self.listener.endpoint,
            open_sessions = self.sessions.len(),
            "stopped accepting sessions"
        );
    }

    fn serve(&self, stream: ConnectionStream) {
        let guard = match self.sessions.track(&stream) {
            Ok(guard) => guard,
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    %error,
                    "cannot track connection; closing it"
                );
                return;
            }
        };
        let handler = Arc::clone(&self.handler);
        let spawned = thread::Builder::new()
            .name("osmp-session".to_owned())
            .spawn(move || {
                let _registered = guard;
                handler.handle(stream);
            });
        if let Err(error) = spawned {
            warn!(target: LISTENER_TARGET, %error, "failed to spawn session thread");
        }
    }
}

/// Handle to a running listener.
///
/// Dropping the handle stops accepting without closing open sessions; use
/// [`ListenerHandle::stop`] for an orderly shutdown.
#[derive(Debug)]
pub struct ListenerHandle {
    stopping: Arc<AtomicBool>,
    sessions: Arc<OpenSessions>,
    local_addr: Option<SocketAddr>,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Bound TCP address; `None` for Unix sockets.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of sessions currently being served.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Stops accepting, then closes every open session.
    ///
    /// Closing a session cancels its in-flight commands and releases its
    /// subscriptions. Returns the number of sessions that were still open
    /// once `grace` elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] when the accept loop panicked.
    pub fn stop(mut self, grace: Duration) -> Result<usize, ListenerError> {
        self.stopping.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            return Err(ListenerError::ThreadPanic);
        }
        Ok(self.sessions.close_all(grace))
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?
        .next()
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    match fs::symlink_metadata(path) {
        Ok(metadata) => reclaim_stale_socket(path, &metadata)?,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(ListenerError::UnixMetadata {
                path: path.display().to_string(),
                source,
            });
        }
    }
    UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
        path: path.display().to_string(),
        source,
    })
}

/// Removes a socket file left behind by a daemon that is no longer running.
#[cfg(unix)]
fn reclaim_stale_socket(path: &Path, metadata: &fs::Metadata) -> Result<(), ListenerError> {
    let path_text = || path.display().to_string();
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::UnixNotSocket { path: path_text() });
    }
    match UnixStream::connect(path) {
        Ok(_live) => Err(ListenerError::UnixInUse { path: path_text() }),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                path: path_text(),
                source,
            })
        }
        Err(source) => Err(ListenerError::UnixConnect {
            path: path_text(),
            source,
        }),
    }
}

#[cfg(unix)]
fn remove_socket_file(endpoint: &SocketEndpoint) {
    let SocketEndpoint::Unix { path } = endpoint else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            %error,
            %path,
            "failed to remove unix socket file"
        );
    }
}
