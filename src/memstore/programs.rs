//! Native programs
//!
//! `MemStore` has no interpreter. A program body is runnable only if the
//! store knows a native equivalent for it: the five built-ins below, which
//! mirror the bodies in `crate::scripts` step for step, or a handler added
//! with `MemStore::define_program`.
//!
//! Every program runs with the keyspace exclusively locked, so like the real
//! thing it executes as one step.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use super::keyspace::{parse_i64, Keyspace, HASH_NOT_INTEGER, NOT_INTEGER, OVERFLOW};
use crate::error::{Result, ScriptKvError};
use crate::protocol::Reply;
use crate::scripts::{sentinel, Builtin};

const DELTA_NOT_INTEGER: &str = "ERR increment is not an integer";
const UNEVEN_HMINC: &str = "ERR fields and increments differ in length";

/// A program the store can run against its keyspace
pub trait NativeProgram: Send + Sync {
    fn run(&self, keyspace: &mut Keyspace, keys: &[Bytes], argv: &[Bytes]) -> Result<Reply>;
}

impl<F> NativeProgram for F
where
    F: Fn(&mut Keyspace, &[Bytes], &[Bytes]) -> Result<Reply> + Send + Sync,
{
    fn run(&self, keyspace: &mut Keyspace, keys: &[Bytes], argv: &[Bytes]) -> Result<Reply> {
        self(keyspace, keys, argv)
    }
}

/// What a loaded body resolves to
#[derive(Clone)]
pub(crate) enum Program {
    Builtin(Builtin),
    Native(Arc<dyn NativeProgram>),
}

impl Program {
    pub(crate) fn run(&self, keyspace: &mut Keyspace, keys: &[Bytes], argv: &[Bytes]) -> Result<Reply> {
        match self {
            Program::Builtin(builtin) => run_builtin(*builtin, keyspace, keys, argv),
            Program::Native(program) => program.run(keyspace, keys, argv),
        }
    }
}

fn run_builtin(builtin: Builtin, ks: &mut Keyspace, keys: &[Bytes], argv: &[Bytes]) -> Result<Reply> {
    let key = nth(keys, 0, builtin)?;
    match builtin {
        Builtin::Cas => compare_and_swap(ks, key, nth(argv, 0, builtin)?, nth(argv, 1, builtin)?),
        Builtin::Cad => compare_and_delete(ks, key, nth(argv, 0, builtin)?),
        Builtin::Incr => increment(ks, key, nth(argv, 0, builtin)?),
        Builtin::HashIncr => hash_increment(ks, key, nth(argv, 0, builtin)?, nth(argv, 1, builtin)?),
        Builtin::HashMultiIncr => multi_field_increment(ks, key, argv),
    }
}

fn nth<'a>(args: &'a [Bytes], index: usize, builtin: Builtin) -> Result<&'a Bytes> {
    args.get(index).ok_or_else(|| {
        ScriptKvError::Store(format!(
            "ERR wrong number of arguments for '{}' script",
            builtin.name()
        ))
    })
}

fn store_err(message: &str) -> ScriptKvError {
    ScriptKvError::store(message)
}

fn compare_and_swap(ks: &mut Keyspace, key: &Bytes, expected: &Bytes, new: &Bytes) -> Result<Reply> {
    match ks.get(key)? {
        Some(current) if current != *expected => Err(store_err(sentinel::VALUE_MISMATCH)),
        _ => {
            ks.set(key.clone(), new.clone(), None);
            Ok(Reply::ok())
        }
    }
}

fn compare_and_delete(ks: &mut Keyspace, key: &Bytes, expected: &Bytes) -> Result<Reply> {
    match ks.get(key)? {
        None => Ok(Reply::Int(0)),
        Some(current) if current == *expected => Ok(Reply::Int(ks.del(key) as i64)),
        Some(_) => Err(store_err(sentinel::VALUE_MISMATCH)),
    }
}

fn parse_delta(raw: &[u8]) -> Result<i64> {
    parse_i64(raw).ok_or_else(|| store_err(DELTA_NOT_INTEGER))
}

/// Refuse a negative delta that would take `current` below zero
fn check_floor(current: i64, delta: i64) -> Result<()> {
    match current.checked_add(delta) {
        Some(next) if next >= 0 => Ok(()),
        _ => Err(store_err(sentinel::INSUFFICIENT)),
    }
}

fn increment(ks: &mut Keyspace, key: &Bytes, raw_delta: &Bytes) -> Result<Reply> {
    let delta = parse_delta(raw_delta)?;
    if delta < 0 {
        let current = match ks.get(key)? {
            Some(raw) => parse_i64(&raw).ok_or_else(|| store_err(NOT_INTEGER))?,
            None => 0,
        };
        check_floor(current, delta)?;
    }
    ks.incr_by(key, delta).map(Reply::Int)
}

fn hash_increment(ks: &mut Keyspace, key: &Bytes, field: &Bytes, raw_delta: &Bytes) -> Result<Reply> {
    let delta = parse_delta(raw_delta)?;
    if delta < 0 {
        let current = match ks.hget(key, field)? {
            Some(raw) => parse_i64(&raw).ok_or_else(|| store_err(HASH_NOT_INTEGER))?,
            None => 0,
        };
        check_floor(current, delta)?;
    }
    ks.hincr_by(key, field, delta).map(Reply::Int)
}

fn multi_field_increment(ks: &mut Keyspace, key: &Bytes, argv: &[Bytes]) -> Result<Reply> {
    if argv.len() % 2 != 0 {
        return Err(store_err(UNEVEN_HMINC));
    }
    let n = argv.len() / 2;
    if n == 0 {
        return Ok(Reply::Array(Vec::new()));
    }

    let (fields, raw_deltas) = argv.split_at(n);
    let current = ks.hmget(key, fields)?;

    // Validate every field before writing any of them.
    let mut pending: HashMap<&Bytes, i64> = HashMap::with_capacity(n);
    let mut results = Vec::with_capacity(n);
    for (i, field) in fields.iter().enumerate() {
        let delta = parse_delta(&raw_deltas[i])?;
        let base = match (pending.get(field), &current[i]) {
            (Some(running), _) => *running,
            (None, Some(raw)) => parse_i64(raw).ok_or_else(|| store_err(HASH_NOT_INTEGER))?,
            (None, None) => 0,
        };
        let value = match base.checked_add(delta) {
            Some(value) if value >= 0 => value,
            None if delta > 0 => return Err(store_err(OVERFLOW)),
            _ => return Err(store_err(sentinel::INSUFFICIENT)),
        };
        pending.insert(field, value);
        results.push(Reply::Int(value));
    }

    // Final value per field; same end state as one HINCRBY per argument.
    let writes = pending
        .into_iter()
        .map(|(field, value)| (field.clone(), Bytes::from(value.to_string())))
        .collect();
    ks.hset(key, writes)?;

    Ok(Reply::Array(results))
}
