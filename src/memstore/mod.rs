//! MemStore Module
//!
//! In-memory development store speaking the subset of the store's command
//! set this crate uses.
//!
//! ## Responsibilities
//! - String and hash keys with lazy expiry (`Keyspace`)
//! - Script cache keyed by SHA-1 content hash (`SCRIPT LOAD/EXISTS/FLUSH`)
//! - `EVAL`/`EVALSHA` of programs it has a native equivalent for
//! - Per-command call counters, for tests
//!
//! `MemStore` is a `ConnPool` itself, so `ScriptKv::with_pool` can sit
//! directly on top of it. It is also what `scriptkv-server` serves over TCP.
//!
//! ## Concurrency
//! One mutex guards the whole keyspace. Every command, including a whole
//! program run, holds it for its duration, so commands are serialized the
//! way a single-threaded store serializes them.

mod commands;
mod keyspace;
mod programs;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use sha1::{Digest, Sha1};

use crate::backend::{Conn, ConnPool};
use crate::error::Result;
use crate::protocol::Reply;
use crate::scripts::Builtin;

pub use keyspace::{parse_i64, Keyspace};
pub use programs::NativeProgram;

use programs::Program;

/// In-memory store
#[derive(Default)]
pub struct MemStore {
    /// All keys; held for the duration of each command
    keyspace: Mutex<Keyspace>,

    /// Content hash -> program body
    scripts: RwLock<HashMap<String, Arc<str>>>,

    /// Program body -> caller-defined native equivalent
    natives: RwLock<HashMap<String, Arc<dyn NativeProgram>>>,

    /// Command name -> times called
    stats: Mutex<HashMap<String, u64>>,
}

impl MemStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// SHA-1 hex digest of a program body, as `SCRIPT LOAD` reports it
    pub fn script_hash(body: &str) -> String {
        hex::encode(Sha1::digest(body.as_bytes()))
    }

    /// Make `body` loadable, running `program` in its place
    pub fn define_program(&self, body: impl Into<String>, program: impl NativeProgram + 'static) {
        self.natives.write().insert(body.into(), Arc::new(program));
    }

    /// Execute one command
    pub fn execute(&self, command: &str, args: &[Bytes]) -> Result<Reply> {
        let name = command.to_ascii_uppercase();
        self.count(&name, args);
        self.dispatch(&name, args)
    }

    /// Execute a raw command frame: name followed by arguments
    pub fn execute_frame(&self, frame: &[Bytes]) -> Result<Reply> {
        match frame.split_first() {
            Some((name, args)) => self.execute(&String::from_utf8_lossy(name), args),
            None => Err(crate::ScriptKvError::store("ERR empty command")),
        }
    }

    /// Drop every cached program (`SCRIPT FLUSH`)
    pub fn flush_scripts(&self) {
        self.scripts.write().clear();
    }

    /// Number of cached programs
    pub fn script_count(&self) -> usize {
        self.scripts.read().len()
    }

    /// How often a command ran; `SCRIPT` subcommands count as e.g. `"SCRIPT LOAD"`
    pub fn command_count(&self, name: &str) -> u64 {
        self.stats
            .lock()
            .get(&name.to_ascii_uppercase())
            .copied()
            .unwrap_or(0)
    }

    /// Run `f` with the keyspace locked, e.g. to inspect state in tests
    pub fn with_keyspace<R>(&self, f: impl FnOnce(&mut Keyspace) -> R) -> R {
        f(&mut self.keyspace.lock())
    }

    fn count(&self, name: &str, args: &[Bytes]) {
        let key = match (name, args.first()) {
            ("SCRIPT", Some(sub)) => format!("SCRIPT {}", String::from_utf8_lossy(sub).to_ascii_uppercase()),
            _ => name.to_string(),
        };
        *self.stats.lock().entry(key).or_insert(0) += 1;
    }

    /// Resolve a body to something runnable
    fn program_for(&self, body: &str) -> Option<Program> {
        if let Some(builtin) = Builtin::from_body(body) {
            return Some(Program::Builtin(builtin));
        }
        self.natives.read().get(body).cloned().map(Program::Native)
    }
}

impl std::fmt::Debug for MemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemStore")
            .field("scripts", &self.scripts.read().len())
            .field("natives", &self.natives.read().len())
            .finish_non_exhaustive()
    }
}

impl Conn for &MemStore {
    fn call(&mut self, command: &str, args: &[Bytes]) -> Result<Reply> {
        self.execute(command, args)
    }
}

impl ConnPool for MemStore {
    fn get(&self) -> Result<Box<dyn Conn + '_>> {
        Ok(Box::new(self))
    }
}

/// An owned connection to a shared `MemStore`
#[derive(Debug, Clone)]
pub struct MemConn {
    store: Arc<MemStore>,
}

impl MemConn {
    pub fn new(store: Arc<MemStore>) -> Self {
        Self { store }
    }
}

impl Conn for MemConn {
    fn call(&mut self, command: &str, args: &[Bytes]) -> Result<Reply> {
        self.store.execute(command, args)
    }
}
