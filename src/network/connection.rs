//! TCP Connection
//!
//! A blocking client connection to a RESP store.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};

use bytes::Bytes;

use crate::backend::Conn;
use crate::config::Config;
use crate::error::{Result, ScriptKvError};
use crate::protocol::{read_reply, write_command, Reply};

/// A single client connection
pub struct TcpConnection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Peer address for logging
    peer_addr: String,

    /// Set once an I/O or framing error leaves the stream out of sync
    broken: bool,
}

impl TcpConnection {
    /// Connect to `config.store_addr`, trying each resolved address in turn
    pub fn connect(config: &Config) -> Result<Self> {
        let mut last_err = None;

        for addr in config.store_addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, config.connect_timeout()) {
                Ok(stream) => return Self::from_stream(stream, config),
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(ScriptKvError::Network(match last_err {
            Some(e) => format!("could not connect to {}: {}", config.store_addr, e),
            None => format!("{} did not resolve to any address", config.store_addr),
        }))
    }

    /// Wrap an already connected stream
    ///
    /// Sets up buffered I/O and configures timeouts
    pub fn from_stream(stream: TcpStream, config: &Config) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.read_timeout())?;
        stream.set_write_timeout(config.write_timeout())?;

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;

        tracing::debug!("Connected to {}", peer_addr);

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            peer_addr,
            broken: false,
        })
    }

    /// True once the connection must not be reused
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

impl Conn for TcpConnection {
    fn call(&mut self, command: &str, args: &[Bytes]) -> Result<Reply> {
        if self.broken {
            return Err(ScriptKvError::Network(format!(
                "connection to {} is broken",
                self.peer_addr
            )));
        }

        let result = write_command(&mut self.writer, command, args)
            .and_then(|_| read_reply(&mut self.reader));

        // A store error reply leaves the stream in sync; anything else may not.
        if let Err(ref e) = result {
            if e.is_io() {
                tracing::warn!("Connection to {} failed: {}", self.peer_addr, e);
                self.broken = true;
            }
        }
        result
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("peer_addr", &self.peer_addr)
            .field("broken", &self.broken)
            .finish()
    }
}
