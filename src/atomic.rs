//! Atomic Operation Library
//!
//! The public primitives: compare-and-swap, compare-and-delete,
//! floor-protected increments and an advisory lease lock.
//!
//! ## Invocation path
//! ```text
//! caller ─▶ ScriptKv ─▶ ScriptRegistry ─▶ Backend ─▶ store
//!                         (name → hash)                │
//! caller ◀── typed error ◀── translate ◀───────────────┘
//! ```
//!
//! Programs are invoked by content hash (`EVALSHA`). If the store answers
//! `NOSCRIPT` (its script cache was flushed behind our back), the entry is
//! reloaded from its stored body and the call is retried exactly once.
//!
//! Atomicity across clients comes entirely from the store running each
//! program as one step. The locking in this process only guards the local
//! name -> hash cache.

use std::sync::Arc;

use bytes::Bytes;

use crate::backend::{Backend, Conn, ConnPool};
use crate::error::{Result, ScriptKvError};
use crate::protocol::{arg, Reply, ToArg};
use crate::registry::{ProgramEntry, ScriptRegistry};
use crate::scripts::{Builtin, SCRIPT_SET_VERSION};
use crate::translate::{is_noscript, translate_result};

/// Handle to the atomic primitives of one store
///
/// Construct one per store; independently configured instances do not share
/// any state.
#[derive(Debug)]
pub struct ScriptKv {
    backend: Backend,
    registry: ScriptRegistry,
}

impl ScriptKv {
    /// Create a library on `backend` and register the built-in programs
    ///
    /// Fails if the backend is unset or any built-in cannot be loaded, so a
    /// half-initialized instance never exists.
    pub fn new(backend: Backend) -> Result<Self> {
        if !backend.is_configured() {
            return Err(ScriptKvError::Uninitialized);
        }

        let kv = Self {
            backend,
            registry: ScriptRegistry::new(),
        };

        for builtin in Builtin::ALL {
            kv.registry
                .register(&kv.backend, builtin.name(), builtin.body(), builtin.key_count())
                .map_err(|e| {
                    tracing::error!(script = builtin.name(), error = %e, "failed to load built-in script");
                    e
                })?;
        }

        tracing::info!(
            backend = ?kv.backend,
            version = SCRIPT_SET_VERSION,
            "script library loaded"
        );
        Ok(kv)
    }

    /// Create a library that takes a pooled connection per call
    pub fn with_pool(pool: impl ConnPool + 'static) -> Result<Self> {
        Self::new(Backend::pool(pool))
    }

    /// Create a library sharing one connection between all callers
    pub fn with_conn(conn: impl Conn + Send + 'static) -> Result<Self> {
        Self::new(Backend::shared(conn))
    }

    // =========================================================================
    // Script Management
    // =========================================================================

    /// Run a program body directly (`EVAL`), without registering it
    pub fn exec(&self, body: &str, key_count: usize, args: &[Bytes]) -> Result<Reply> {
        let mut argv = Vec::with_capacity(args.len() + 2);
        argv.push(arg(body));
        argv.push(arg(&key_count));
        argv.extend_from_slice(args);
        translate_result(self.backend.call("EVAL", &argv))
    }

    /// Load a program on the store and make it callable as `name`
    pub fn register_script(&self, name: &str, body: &str, key_count: usize) -> Result<()> {
        self.registry
            .register(&self.backend, name, body, key_count)
            .map(|_| ())
    }

    /// Invoke a registered program
    ///
    /// `args` holds the keys first, then the plain values.
    pub fn call_script(&self, name: &str, args: &[Bytes]) -> Result<Reply> {
        translate_result(self.invoke(name, args))
    }

    /// Forget a program locally; the store keeps its cached copy
    pub fn delete_script(&self, name: &str) -> bool {
        self.registry.invalidate(name)
    }

    /// Ask the store whether it still caches the program registered as `name`
    pub fn script_exists(&self, name: &str) -> Result<bool> {
        let entry = self.resolve(name)?;
        let reply = self
            .backend
            .call("SCRIPT", &[arg("EXISTS"), entry.content_hash().clone()])?;

        match reply {
            Reply::Array(items) => match items.first() {
                Some(flag) => Ok(flag.as_int()? == 1),
                None => Err(ScriptKvError::Protocol(
                    "SCRIPT EXISTS returned an empty array".to_string(),
                )),
            },
            other => Ok(other.as_int()? == 1),
        }
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    // =========================================================================
    // Primitives
    // =========================================================================

    /// Set `key` to `new` if it is absent or currently equals `expected`
    ///
    /// Fails with `ValueMismatch` otherwise; the stored value is untouched.
    pub fn compare_and_swap<K, O, N>(&self, key: &K, expected: &O, new: &N) -> Result<()>
    where
        K: ToArg + ?Sized,
        O: ToArg + ?Sized,
        N: ToArg + ?Sized,
    {
        self.call_script(Builtin::Cas.name(), &[arg(key), arg(expected), arg(new)])?;
        Ok(())
    }

    /// Delete `key` if it currently equals `expected`
    ///
    /// Returns the number of keys removed: 0 when the key was already absent,
    /// 1 when it was deleted. Fails with `ValueMismatch` if the key holds
    /// another value.
    pub fn compare_and_delete<K, V>(&self, key: &K, expected: &V) -> Result<u64>
    where
        K: ToArg + ?Sized,
        V: ToArg + ?Sized,
    {
        let reply = self.call_script(Builtin::Cad.name(), &[arg(key), arg(expected)])?;
        Ok(reply.as_int()?.max(0) as u64)
    }

    /// Add `delta` to the integer at `key`, never going below zero
    ///
    /// An absent key counts as 0. Fails with `Insufficient`, leaving the
    /// value unchanged, if the result would be negative.
    pub fn increment<K: ToArg + ?Sized>(&self, key: &K, delta: i64) -> Result<i64> {
        self.call_script(Builtin::Incr.name(), &[arg(key), arg(&delta)])?
            .as_int()
    }

    /// Add `delta` to a hash field, never going below zero
    pub fn hash_increment<K, F>(&self, key: &K, field: &F, delta: i64) -> Result<i64>
    where
        K: ToArg + ?Sized,
        F: ToArg + ?Sized,
    {
        self.call_script(Builtin::HashIncr.name(), &[arg(key), arg(field), arg(&delta)])?
            .as_int()
    }

    /// Apply one delta per field, all or nothing
    ///
    /// Every resulting value is checked before anything is written; if any
    /// would be negative the call fails with `Insufficient` and no field
    /// changes. New values are returned in input order. A present field that
    /// does not hold an integer is reported as a store error, never treated
    /// as 0.
    pub fn multi_field_increment<K, F>(
        &self,
        key: &K,
        fields: &[F],
        deltas: &[i64],
    ) -> Result<Vec<i64>>
    where
        K: ToArg + ?Sized,
        F: ToArg,
    {
        if fields.len() != deltas.len() {
            return Err(ScriptKvError::ArgumentMismatch {
                fields: fields.len(),
                deltas: deltas.len(),
            });
        }

        let mut argv = Vec::with_capacity(fields.len() * 2 + 1);
        argv.push(arg(key));
        argv.extend(fields.iter().map(ToArg::to_arg));
        argv.extend(deltas.iter().map(ToArg::to_arg));

        let values = self
            .call_script(Builtin::HashMultiIncr.name(), &argv)?
            .into_int_array()?;
        if values.len() != fields.len() {
            return Err(ScriptKvError::Protocol(format!(
                "HMINC returned {} values for {} fields",
                values.len(),
                fields.len()
            )));
        }
        Ok(values)
    }

    /// Take the lease on `key` for `ttl_seconds`, if nobody holds it
    ///
    /// Uses the store's conditional set with expiry directly. Fails with
    /// `LockOccupied` when the key already exists.
    pub fn lock<K, T>(&self, key: &K, token: &T, ttl_seconds: u64) -> Result<()>
    where
        K: ToArg + ?Sized,
        T: ToArg + ?Sized,
    {
        let reply = translate_result(self.backend.call(
            "SET",
            &[arg(key), arg(token), arg("NX"), arg("EX"), arg(&ttl_seconds)],
        ))?;

        match reply {
            Reply::Nil => Err(ScriptKvError::LockOccupied),
            _ => Ok(()),
        }
    }

    /// Release the lease on `key` if it is still held under `token`
    ///
    /// `ValueMismatch` means you no longer hold the lease. It cannot tell
    /// apart "someone else took it" and "it expired and was reacquired";
    /// treat both the same. Unlocking an absent key (expired, not
    /// reacquired) succeeds.
    pub fn unlock<K, T>(&self, key: &K, token: &T) -> Result<()>
    where
        K: ToArg + ?Sized,
        T: ToArg + ?Sized,
    {
        self.compare_and_delete(key, token).map(|_| ())
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn resolve(&self, name: &str) -> Result<Arc<ProgramEntry>> {
        self.registry
            .resolve(name)
            .ok_or_else(|| ScriptKvError::NotRegistered(name.to_string()))
    }

    /// Resolve and run, reloading once on `NOSCRIPT`
    fn invoke(&self, name: &str, args: &[Bytes]) -> Result<Reply> {
        let entry = self.resolve(name)?;

        match self.eval_sha(&entry, args) {
            Err(err) if is_noscript(&err) => {
                tracing::warn!(script = name, "store lost cached script, reloading");
                let entry = self.registry.reload(&self.backend, &entry)?;
                self.eval_sha(&entry, args)
            }
            result => result,
        }
    }

    fn eval_sha(&self, entry: &ProgramEntry, args: &[Bytes]) -> Result<Reply> {
        let mut argv = Vec::with_capacity(args.len() + 2);
        argv.push(entry.content_hash().clone());
        argv.push(arg(&entry.key_count()));
        argv.extend_from_slice(args);
        self.backend.call("EVALSHA", &argv)
    }
}
