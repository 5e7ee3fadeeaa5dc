//! Script Registry
//!
//! Maps a logical program name to its body, the content hash the store
//! assigned when the body was loaded, and its key-argument count.
//!
//! ## Concurrency
//! - `resolve` takes the read lock only; it never touches the network.
//! - `register` loads the body on the store *without* holding the lock, then
//!   takes the write lock just long enough to insert. The name is checked
//!   again under the write lock, so when two registrations of one name race,
//!   exactly one of them fails with `AlreadyRegistered`.
//! - An entry is visible only after the store confirmed the load.
//! - `reload` swaps an entry in place, so a name never disappears while its
//!   program is being reloaded.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::backend::Backend;
use crate::error::{Result, ScriptKvError};
use crate::protocol::{arg, Reply};

/// One registered program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramEntry {
    name: String,
    body: Arc<str>,
    content_hash: Bytes,
    key_count: usize,
}

impl ProgramEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Program source
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Opaque handle returned by `SCRIPT LOAD`
    pub fn content_hash(&self) -> &Bytes {
        &self.content_hash
    }

    /// Number of leading arguments the program treats as keys
    pub fn key_count(&self) -> usize {
        self.key_count
    }
}

/// Thread-safe name -> program map
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    scripts: RwLock<HashMap<String, Arc<ProgramEntry>>>,
}

impl ScriptRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `body` on the store and record it under `name`
    ///
    /// Fails with `AlreadyRegistered` if `name` is taken, or with the load
    /// error; in both cases the registry is left unchanged.
    pub fn register(
        &self,
        backend: &Backend,
        name: &str,
        body: &str,
        key_count: usize,
    ) -> Result<Arc<ProgramEntry>> {
        if self.scripts.read().contains_key(name) {
            return Err(ScriptKvError::AlreadyRegistered(name.to_string()));
        }

        let content_hash = load(backend, name, body)?;

        let entry = Arc::new(ProgramEntry {
            name: name.to_string(),
            body: Arc::from(body),
            content_hash,
            key_count,
        });

        match self.scripts.write().entry(name.to_string()) {
            Entry::Occupied(_) => Err(ScriptKvError::AlreadyRegistered(name.to_string())),
            Entry::Vacant(slot) => {
                tracing::debug!(
                    script = name,
                    hash = %String::from_utf8_lossy(&entry.content_hash),
                    key_count,
                    "script registered"
                );
                slot.insert(Arc::clone(&entry));
                Ok(entry)
            }
        }
    }

    /// Look up a program by name
    pub fn resolve(&self, name: &str) -> Option<Arc<ProgramEntry>> {
        self.scripts.read().get(name).cloned()
    }

    /// Forget `name` locally
    ///
    /// The store keeps its cached copy of the program. Returns whether an
    /// entry was removed.
    pub fn invalidate(&self, name: &str) -> bool {
        let removed = self.scripts.write().remove(name).is_some();
        if removed {
            tracing::debug!(script = name, "script invalidated");
        }
        removed
    }

    /// Load the body of `stale` again and swap the fresh entry in
    ///
    /// The name stays resolvable throughout. If another caller replaced the
    /// entry in the meantime, theirs is kept and returned; if the name was
    /// removed, this fails with `NotRegistered`.
    pub fn reload(&self, backend: &Backend, stale: &Arc<ProgramEntry>) -> Result<Arc<ProgramEntry>> {
        let content_hash = load(backend, stale.name(), stale.body())?;

        let mut scripts = self.scripts.write();
        match scripts.get(stale.name()) {
            Some(current) if Arc::ptr_eq(current, stale) => {
                let entry = Arc::new(ProgramEntry {
                    content_hash,
                    ..ProgramEntry::clone(stale)
                });
                scripts.insert(stale.name().to_string(), Arc::clone(&entry));
                tracing::debug!(script = stale.name(), "script reloaded");
                Ok(entry)
            }
            Some(current) => Ok(Arc::clone(current)),
            None => Err(ScriptKvError::NotRegistered(stale.name().to_string())),
        }
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scripts.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.scripts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.read().is_empty()
    }
}

/// `SCRIPT LOAD` a body, returning the store's content hash
fn load(backend: &Backend, name: &str, body: &str) -> Result<Bytes> {
    match backend.call("SCRIPT", &[arg("LOAD"), arg(body)])? {
        Reply::Bulk(hash) => Ok(hash),
        Reply::Status(hash) => Ok(Bytes::from(hash)),
        other => Err(ScriptKvError::Protocol(format!(
            "SCRIPT LOAD returned {:?} for '{}'",
            other, name
        ))),
    }
}
