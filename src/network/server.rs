//! TCP Server
//!
//! Accepts connections and serves each on its own thread.

use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::Session;
use crate::config::Config;
use crate::error::Result;
use crate::memstore::MemStore;
use crate::protocol::encode_error;

/// How long the accept loop sleeps when no client is waiting
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// TCP server exposing a `MemStore`
pub struct Server {
    config: Config,
    store: Arc<MemStore>,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

/// Stops a running server from another thread
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl Server {
    /// Bind `config.listen_addr`
    ///
    /// Port 0 picks a free port; see `local_addr`.
    pub fn bind(config: Config, store: Arc<MemStore>) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(&config.listen_addr)?;
        // Non-blocking accept so the loop can notice shutdown
        listener.set_nonblocking(true)?;

        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            store,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Number of sessions currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Start the server (blocking until shutdown)
    ///
    /// Sessions already running finish on their own threads.
    pub fn run(&self) -> Result<()> {
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => self.dispatch(stream, addr),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                }
            }
        }

        tracing::info!("Server shut down");
        Ok(())
    }

    fn dispatch(&self, mut stream: TcpStream, addr: SocketAddr) {
        if self.active.load(Ordering::Relaxed) >= self.config.max_connections {
            tracing::warn!("Rejecting {}: connection limit reached", addr);
            let _ = stream.write_all(&encode_error("ERR max number of clients reached"));
            return;
        }

        // Accepted sockets inherit non-blocking mode on some platforms.
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Dropping {}: {}", addr, e);
            return;
        }

        let store = Arc::clone(&self.store);
        let active = Arc::clone(&self.active);
        let (read_ms, write_ms) = (self.config.read_timeout_ms, self.config.write_timeout_ms);

        active.fetch_add(1, Ordering::Relaxed);
        let spawned = thread::Builder::new()
            .name(format!("session-{}", addr))
            .spawn(move || {
                let result = Session::new(stream, store).and_then(|mut session| {
                    session.set_timeouts(read_ms, write_ms)?;
                    session.handle()
                });
                if let Err(e) = result {
                    tracing::debug!("Session {} ended with error: {}", addr, e);
                }
                active.fetch_sub(1, Ordering::Relaxed);
            });

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn session thread: {}", e);
            self.active.fetch_sub(1, Ordering::Relaxed);
        }
    }
}
