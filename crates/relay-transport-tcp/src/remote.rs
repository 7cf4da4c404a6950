//! A TCP-backed [`Remote`] (§4.3, grounded on the teacher's `TcpChannel`).
//!
//! # Why
//! `relay-engine` defines `Remote` as a close-only contract: ask it to
//! close, get exactly one `notify_remote_closed` back. A real connection
//! still needs the graceful-shutdown sequence the teacher's `TcpChannel`
//! uses for `close_graceful` — write-side FIN, then drain until the peer's
//! EOF — so this crate reimplements that sequence instead of the
//! read/write/poll_ready surface the teacher also exposes, which belongs
//! to a full transport crate rather than to the shutdown coordinator.
//!
//! # How
//! [`TcpSocketConfig`] mirrors the teacher's `linger`-only socket
//! configuration, applied through `socket2::SockRef` the same way.
//! [`TcpRemote::close`] spawns the graceful-close sequence onto a stored
//! `tokio::runtime::Handle` (rather than `tokio::spawn`, since `close` runs
//! on the engine's runloop thread, which is not necessarily inside a Tokio
//! runtime) and reports back via [`RemoteLocator`] once the socket is gone.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use relay_engine::engine::{EngineHandle, RemoteLocator};
use relay_engine::resources::Remote;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// Socket-level configuration applied on construction (§4.9's concrete
/// runloop executor has no equivalent here; this mirrors the teacher's
/// `TcpSocketConfig` instead, one layer down in the transport stack).
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpSocketConfig {
    linger: Option<Duration>,
}

impl TcpSocketConfig {
    pub const fn new() -> Self {
        Self { linger: None }
    }

    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger = linger;
        self
    }

    pub fn linger(&self) -> Option<Duration> {
        self.linger
    }

    fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        socket2::SockRef::from(stream).set_linger(self.linger)
    }
}

/// A live TCP connection registered with an engine as a [`Remote`].
///
/// Construct inside a Tokio runtime (it captures [`Handle::current`]), call
/// `EngineHandle::insert_remote`/`insert_weak_remote` to register it, then
/// call [`TcpRemote::set_locator`] with whichever [`RemoteLocator`] matches
/// — the same two-step pattern `relay_engine::testkit`'s fakes use, since
/// the engine (not the remote) owns the decision of which registry the
/// remote lives in.
pub struct TcpRemote {
    stream: Arc<AsyncMutex<Option<TcpStream>>>,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    runtime: Handle,
    locator: OnceLock<RemoteLocator>,
}

impl TcpRemote {
    pub fn new(stream: TcpStream, config: TcpSocketConfig) -> io::Result<Self> {
        config.apply(&stream)?;
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        Ok(Self {
            stream: Arc::new(AsyncMutex::new(Some(stream))),
            peer_addr,
            local_addr,
            runtime: Handle::current(),
            locator: OnceLock::new(),
        })
    }

    pub fn set_locator(&self, locator: RemoteLocator) {
        self.locator.set(locator).ok();
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Remote for TcpRemote {
    fn close(&self, engine: EngineHandle) {
        let locator = self
            .locator
            .get()
            .cloned()
            .expect("TcpRemote::set_locator must be called before the engine can close it");
        let stream = Arc::clone(&self.stream);
        let peer = self.peer_addr;

        self.runtime.spawn(async move {
            let mut guard = stream.lock().await;
            if let Some(mut sock) = guard.take() {
                if let Err(err) = sock.shutdown().await {
                    warn!(peer = %peer, error = %err, "TcpRemote: write half-close failed, closing anyway");
                } else if let Err(err) = drain_until_eof(&mut sock).await {
                    warn!(peer = %peer, error = %err, "TcpRemote: error waiting for peer EOF, closing anyway");
                }
                debug!(peer = %peer, "TcpRemote: socket released");
            }
            engine.notify_remote_closed(locator);
        });
    }
}

async fn drain_until_eof(stream: &mut TcpStream) -> io::Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(_) => continue,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
            Err(err) => return Err(err),
        }
    }
}
