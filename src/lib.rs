//! # scriptkv
//!
//! Atomic coordination primitives on top of a key-value store that can run
//! short programs server-side:
//! - Compare-and-swap / compare-and-delete
//! - Increments that refuse to go below zero (single key, hash field, or
//!   several hash fields all-or-nothing)
//! - Advisory lease locks
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         ScriptKv                             │
//! │      (CAS / CAD / INC / HINC / HMINC / lock / unlock)        │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!        ┌───────────────┐              ┌───────────────┐
//!        │ScriptRegistry │              │   translate   │
//!        │ (name → hash) │              │ (error text → │
//!        └───────┬───────┘              │  typed error) │
//!                │                      └───────▲───────┘
//!                ▼                              │
//!        ┌───────────────────────────────────────┴───────┐
//!        │           Backend (pool or shared conn)        │
//!        └───────────────────────┬───────────────────────┘
//!                                │ RESP
//!                  ┌─────────────┴─────────────┐
//!                  ▼                           ▼
//!           ┌─────────────┐             ┌─────────────┐
//!           │ Redis-like  │             │  MemStore   │
//!           │   store     │             │ (dev/test)  │
//!           └─────────────┘             └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use scriptkv::{MemStore, ScriptKv, ScriptKvError};
//!
//! let store = Arc::new(MemStore::new());
//! let kv = ScriptKv::with_pool(Arc::clone(&store)).unwrap();
//!
//! assert_eq!(kv.increment("stock", 5).unwrap(), 5);
//! assert!(matches!(kv.increment("stock", -9), Err(ScriptKvError::Insufficient)));
//!
//! kv.lock("job:42", "worker-a", 30).unwrap();
//! assert!(matches!(kv.lock("job:42", "worker-b", 30), Err(ScriptKvError::LockOccupied)));
//! kv.unlock("job:42", "worker-a").unwrap();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod backend;
pub mod scripts;
pub mod translate;
pub mod registry;
pub mod atomic;
pub mod memstore;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, ScriptKvError};
pub use config::Config;
pub use backend::{Backend, Conn, ConnPool};
pub use protocol::{arg, Reply, ToArg};
pub use registry::{ProgramEntry, ScriptRegistry};
pub use atomic::ScriptKv;
pub use memstore::{MemConn, MemStore};
pub use network::{TcpConnection, TcpPool};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of scriptkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
