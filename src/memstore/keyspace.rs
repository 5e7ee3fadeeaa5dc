//! Keyspace
//!
//! The data held by a `MemStore`: string and hash values with optional
//! expiry. Expired keys are dropped lazily, on the next access.
//!
//! All methods take `&mut self`; the owning store serializes access, which is
//! what makes a program run against the keyspace atomic.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::error::{Result, ScriptKvError};

pub(crate) const WRONGTYPE: &str =
    "WRONGTYPE Operation against a key holding the wrong kind of value";
pub(crate) const NOT_INTEGER: &str = "ERR value is not an integer or out of range";
pub(crate) const HASH_NOT_INTEGER: &str = "ERR hash value is not an integer";
pub(crate) const OVERFLOW: &str = "ERR increment or decrement would overflow";

/// A stored value
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Str(Bytes),
    Hash(BTreeMap<Bytes, Bytes>),
}

#[derive(Debug)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Key -> value map with lazy expiry
#[derive(Debug, Default)]
pub struct Keyspace {
    data: HashMap<Bytes, Slot>,
}

/// Parse a stored value as a plain decimal i64: optional `-`, then digits
pub fn parse_i64(raw: &[u8]) -> Option<i64> {
    let digits = raw.strip_prefix(b"-").unwrap_or(raw);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(raw).ok()?.parse::<i64>().ok()
}

fn int_bytes(n: i64) -> Bytes {
    Bytes::from(n.to_string())
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `key`, dropping it first if it has expired
    fn live(&mut self, key: &[u8]) -> Option<&mut Slot> {
        let expired = matches!(self.data.get(key), Some(slot) if slot.is_expired(Instant::now()));
        if expired {
            self.data.remove(key);
            return None;
        }
        self.data.get_mut(key)
    }

    pub fn exists(&mut self, key: &[u8]) -> bool {
        self.live(key).is_some()
    }

    /// Number of live keys
    pub fn len(&mut self) -> usize {
        let now = Instant::now();
        self.data.retain(|_, slot| !slot.is_expired(now));
        self.data.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    // -------------------------------------------------------------------------
    // Strings
    // -------------------------------------------------------------------------

    pub fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        match self.live(key) {
            None => Ok(None),
            Some(Slot { value: Value::Str(v), .. }) => Ok(Some(v.clone())),
            Some(_) => Err(ScriptKvError::store(WRONGTYPE)),
        }
    }

    /// Overwrite `key`, replacing any previous type and expiry
    pub fn set(&mut self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        let slot = Slot {
            value: Value::Str(value),
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.data.insert(key, slot);
    }

    pub fn del(&mut self, key: &[u8]) -> bool {
        self.live(key).is_some() && self.data.remove(key).is_some()
    }

    /// Remaining lifetime in whole seconds: -2 if absent, -1 if persistent
    pub fn ttl(&mut self, key: &[u8]) -> i64 {
        match self.live(key) {
            None => -2,
            Some(Slot { expires_at: None, .. }) => -1,
            Some(Slot { expires_at: Some(at), .. }) => {
                let left = at.saturating_duration_since(Instant::now());
                // Round up so a fresh `EX 10` reports 10, not 9.
                left.as_millis().div_ceil(1000) as i64
            }
        }
    }

    /// Add `delta` to an integer string; absent counts as 0, expiry is kept
    pub fn incr_by(&mut self, key: &[u8], delta: i64) -> Result<i64> {
        match self.live(key) {
            None => {
                self.data.insert(
                    Bytes::copy_from_slice(key),
                    Slot { value: Value::Str(int_bytes(delta)), expires_at: None },
                );
                Ok(delta)
            }
            Some(Slot { value: Value::Str(v), .. }) => {
                let current = parse_i64(v).ok_or_else(|| ScriptKvError::store(NOT_INTEGER))?;
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| ScriptKvError::store(OVERFLOW))?;
                *v = int_bytes(next);
                Ok(next)
            }
            Some(_) => Err(ScriptKvError::store(WRONGTYPE)),
        }
    }

    // -------------------------------------------------------------------------
    // Hashes
    // -------------------------------------------------------------------------

    fn hash(&mut self, key: &[u8]) -> Result<Option<&mut BTreeMap<Bytes, Bytes>>> {
        match self.live(key) {
            None => Ok(None),
            Some(Slot { value: Value::Hash(h), .. }) => Ok(Some(h)),
            Some(_) => Err(ScriptKvError::store(WRONGTYPE)),
        }
    }

    fn hash_or_create(&mut self, key: &[u8]) -> Result<&mut BTreeMap<Bytes, Bytes>> {
        if self.hash(key)?.is_none() {
            self.data.insert(
                Bytes::copy_from_slice(key),
                Slot { value: Value::Hash(BTreeMap::new()), expires_at: None },
            );
        }
        match self.data.get_mut(key) {
            Some(Slot { value: Value::Hash(h), .. }) => Ok(h),
            _ => Err(ScriptKvError::store(WRONGTYPE)),
        }
    }

    pub fn hget(&mut self, key: &[u8], field: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.hash(key)?.and_then(|h| h.get(field).cloned()))
    }

    pub fn hmget(&mut self, key: &[u8], fields: &[Bytes]) -> Result<Vec<Option<Bytes>>> {
        match self.hash(key)? {
            None => Ok(vec![None; fields.len()]),
            Some(h) => Ok(fields.iter().map(|f| h.get(f).cloned()).collect()),
        }
    }

    /// Set fields, returning how many were newly created
    pub fn hset(&mut self, key: &[u8], pairs: Vec<(Bytes, Bytes)>) -> Result<usize> {
        let hash = self.hash_or_create(key)?;
        let mut created = 0;
        for (field, value) in pairs {
            if hash.insert(field, value).is_none() {
                created += 1;
            }
        }
        Ok(created)
    }

    pub fn hincr_by(&mut self, key: &[u8], field: &[u8], delta: i64) -> Result<i64> {
        let hash = self.hash_or_create(key)?;
        let current = match hash.get(field) {
            Some(v) => parse_i64(v).ok_or_else(|| ScriptKvError::store(HASH_NOT_INTEGER))?,
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| ScriptKvError::store(OVERFLOW))?;
        hash.insert(Bytes::copy_from_slice(field), int_bytes(next));
        Ok(next)
    }

    pub fn hgetall(&mut self, key: &[u8]) -> Result<Vec<(Bytes, Bytes)>> {
        Ok(self
            .hash(key)?
            .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}
