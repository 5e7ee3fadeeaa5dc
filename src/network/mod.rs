//! Network Module
//!
//! TCP client and development server.
//!
//! ## Architecture
//! - Client: `TcpConnection` speaks RESP to any store; `TcpPool` keeps idle
//!   connections and implements `ConnPool`
//! - Server: single acceptor thread, one thread per `Session`, commands run
//!   against a shared `MemStore`

mod connection;
mod pool;
mod server;
mod session;

pub use connection::TcpConnection;
pub use pool::TcpPool;
pub use server::{Server, ShutdownHandle};
pub use session::Session;
