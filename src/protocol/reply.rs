//! Reply definitions
//!
//! Represents a successful reply from the store. Error replies never become a
//! `Reply`; they surface as `ScriptKvError::Store`.

use bytes::Bytes;

use crate::error::{Result, ScriptKvError};

/// A decoded store reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nil bulk string or nil array
    Nil,

    /// Simple string, e.g. `OK` or `PONG`
    Status(String),

    /// Integer reply
    Int(i64),

    /// Bulk string
    Bulk(Bytes),

    /// Array of nested replies
    Array(Vec<Reply>),
}

impl Reply {
    /// Shorthand for the `OK` status reply
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn bulk(value: impl Into<Bytes>) -> Self {
        Reply::Bulk(value.into())
    }

    /// Interpret the reply as an integer
    ///
    /// Bulk strings holding a decimal integer are accepted, as some stores
    /// return counters that way.
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Reply::Int(n) => Ok(*n),
            Reply::Bulk(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| ScriptKvError::Protocol(format!("expected integer reply, got {:?}", self))),
            other => Err(ScriptKvError::Protocol(format!(
                "expected integer reply, got {:?}",
                other
            ))),
        }
    }

    /// Interpret the reply as an array of integers
    pub fn into_int_array(self) -> Result<Vec<i64>> {
        match self {
            Reply::Array(items) => items.iter().map(Reply::as_int).collect(),
            Reply::Nil => Ok(Vec::new()),
            other => Err(ScriptKvError::Protocol(format!(
                "expected array reply, got {:?}",
                other
            ))),
        }
    }

    /// Bulk payload, if any
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Bulk(bytes) => Some(bytes),
            Reply::Status(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

impl From<i64> for Reply {
    fn from(n: i64) -> Self {
        Reply::Int(n)
    }
}

impl From<Option<Bytes>> for Reply {
    fn from(value: Option<Bytes>) -> Self {
        value.map(Reply::Bulk).unwrap_or(Reply::Nil)
    }
}
