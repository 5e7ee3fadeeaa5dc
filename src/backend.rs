//! Connection Abstraction
//!
//! The narrow contract this crate needs from a store client: run one command
//! and return its reply. A store can be reached either through a pool that
//! hands out a connection per call, or through one shared connection.
//!
//! ## Responsibilities
//! - Acquire a connection per call and release it immediately (pool mode)
//! - Serialize callers on the single connection (shared mode)
//! - Fail with `Uninitialized` when nothing is configured
//!
//! Nothing here retries, times out, or caches per-connection state.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Result, ScriptKvError};
use crate::protocol::Reply;

/// A connection able to execute store commands
///
/// An error reply from the store must be returned as
/// `ScriptKvError::Store` with the store's text, so the translator can
/// classify it.
pub trait Conn {
    fn call(&mut self, command: &str, args: &[Bytes]) -> Result<Reply>;
}

impl<C: Conn + ?Sized> Conn for Box<C> {
    fn call(&mut self, command: &str, args: &[Bytes]) -> Result<Reply> {
        (**self).call(command, args)
    }
}

/// A source of connections
///
/// The connection returned by `get` is released when it is dropped.
pub trait ConnPool: Send + Sync {
    fn get(&self) -> Result<Box<dyn Conn + '_>>;
}

impl<P: ConnPool + ?Sized> ConnPool for Arc<P> {
    fn get(&self) -> Result<Box<dyn Conn + '_>> {
        (**self).get()
    }
}

/// Where store commands are sent
#[derive(Default)]
pub enum Backend {
    /// Nothing configured; every call fails with `Uninitialized`
    #[default]
    Unset,

    /// Scoped connection per call
    Pool(Box<dyn ConnPool>),

    /// One connection shared by all callers
    Shared(Mutex<Box<dyn Conn + Send>>),
}

impl Backend {
    pub fn pool(pool: impl ConnPool + 'static) -> Self {
        Backend::Pool(Box::new(pool))
    }

    pub fn shared(conn: impl Conn + Send + 'static) -> Self {
        Backend::Shared(Mutex::new(Box::new(conn)))
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, Backend::Unset)
    }

    /// Execute one command against the store
    pub fn call(&self, command: &str, args: &[Bytes]) -> Result<Reply> {
        tracing::trace!(command, argc = args.len(), "store call");

        match self {
            Backend::Pool(pool) => {
                let mut conn = pool.get()?;
                conn.call(command, args)
            }
            Backend::Shared(conn) => conn.lock().call(command, args),
            Backend::Unset => Err(ScriptKvError::Uninitialized),
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Backend::Unset => "Unset",
            Backend::Pool(_) => "Pool",
            Backend::Shared(_) => "Shared",
        };
        f.debug_tuple("Backend").field(&kind).finish()
    }
}
