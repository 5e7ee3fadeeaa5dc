//! Session Handler
//!
//! Serves one client connection of the development server.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, ScriptKvError};
use crate::memstore::MemStore;
use crate::protocol::{read_command, write_error, write_reply};

/// Handles a single client connection
pub struct Session {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Store the commands run against
    store: Arc<MemStore>,

    /// Peer address for logging
    peer_addr: String,
}

impl Session {
    /// Create a new session handler
    ///
    /// Sets up buffered I/O
    pub fn new(stream: TcpStream, store: Arc<MemStore>) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            store,
            peer_addr,
        })
    }

    /// Configure connection timeouts
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads commands in a loop and sends replies.
    /// Returns when the client disconnects or an error occurs.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Session established from {}", self.peer_addr);

        loop {
            let frame = match read_command(&mut self.reader) {
                Ok(frame) => frame,
                Err(ScriptKvError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Client {} disconnected ({:?})", self.peer_addr, e.kind());
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    // Send error reply if possible
                    let _ = write_error(&mut self.writer, &format!("ERR {}", e));
                    return Err(e);
                }
            };

            tracing::trace!(
                "Received {} from {}",
                String::from_utf8_lossy(&frame[0]),
                self.peer_addr
            );

            let written = match self.store.execute_frame(&frame) {
                Ok(reply) => write_reply(&mut self.writer, &reply),
                Err(ScriptKvError::Store(message)) => write_error(&mut self.writer, &message),
                Err(e) => write_error(&mut self.writer, &format!("ERR {}", e)),
            };

            if let Err(e) = written {
                // The client went away before we could answer; not a server error.
                if let ScriptKvError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) || io_err.kind() == std::io::ErrorKind::BrokenPipe {
                        tracing::debug!(
                            "Client {} disconnected before reply could be sent: {}",
                            self.peer_addr, e
                        );
                        return Ok(());
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

/// Errors that mean the peer is gone or idle past the read timeout
fn is_disconnect(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        kind,
        UnexpectedEof | ConnectionReset | ConnectionAborted | WouldBlock | TimedOut
    )
}
