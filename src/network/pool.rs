//! Connection Pool
//!
//! Bounded pool of idle `TcpConnection`s.
//!
//! `get` reuses an idle connection or dials a new one; the connection goes
//! back to the idle queue when the returned handle is dropped. Broken
//! connections, and any beyond `pool_size` idle ones, are closed instead.

use bytes::Bytes;
use crossbeam::queue::ArrayQueue;

use super::TcpConnection;
use crate::backend::{Conn, ConnPool};
use crate::config::Config;
use crate::error::{Result, ScriptKvError};
use crate::protocol::Reply;

/// Pool of client connections to one store
pub struct TcpPool {
    config: Config,
    idle: ArrayQueue<TcpConnection>,
}

impl TcpPool {
    /// Create an empty pool; connections are dialed on demand
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            idle: ArrayQueue::new(config.pool_size),
            config,
        })
    }

    /// Number of idle connections currently held
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn checkout(&self) -> Result<TcpConnection> {
        match self.idle.pop() {
            Some(conn) => Ok(conn),
            None => TcpConnection::connect(&self.config),
        }
    }
}

impl ConnPool for TcpPool {
    fn get(&self) -> Result<Box<dyn Conn + '_>> {
        let conn = self.checkout()?;
        Ok(Box::new(PooledConnection {
            pool: self,
            conn: Some(conn),
        }))
    }
}

impl std::fmt::Debug for TcpPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpPool")
            .field("store_addr", &self.config.store_addr)
            .field("idle", &self.idle.len())
            .finish()
    }
}

/// A connection checked out of a `TcpPool`
struct PooledConnection<'a> {
    pool: &'a TcpPool,
    conn: Option<TcpConnection>,
}

impl Conn for PooledConnection<'_> {
    fn call(&mut self, command: &str, args: &[Bytes]) -> Result<Reply> {
        match self.conn.as_mut() {
            Some(conn) => conn.call(command, args),
            None => Err(ScriptKvError::Network("connection already released".to_string())),
        }
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if conn.is_broken() {
                tracing::debug!("Discarding broken connection to {}", conn.peer_addr());
            } else if self.pool.idle.push(conn).is_err() {
                tracing::trace!("Idle queue full, closing connection");
            }
        }
    }
}
