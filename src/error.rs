//! Error types for scriptkv
//!
//! Provides a unified error type for all operations.
//!
//! The first group of variants is the typed taxonomy callers are expected to
//! match on. Everything below it is passthrough from the store or transport.

use thiserror::Error;

use crate::scripts::sentinel;

/// Result type alias using ScriptKvError
pub type Result<T> = std::result::Result<T, ScriptKvError>;

/// Unified error type for scriptkv operations
#[derive(Debug, Error)]
pub enum ScriptKvError {
    // -------------------------------------------------------------------------
    // Primitive Outcomes
    // -------------------------------------------------------------------------
    /// A decrement would take the value below zero. Nothing was written.
    #[error("{}", sentinel::INSUFFICIENT)]
    Insufficient,

    /// A compare-and-* found a different value. Nothing was written.
    #[error("{}", sentinel::VALUE_MISMATCH)]
    ValueMismatch,

    /// The lease is held under another token.
    #[error("{}", sentinel::LOCK_OCCUPIED)]
    LockOccupied,

    #[error("Argument mismatch: {fields} fields but {deltas} deltas")]
    ArgumentMismatch { fields: usize, deltas: usize },

    // -------------------------------------------------------------------------
    // Registry Errors
    // -------------------------------------------------------------------------
    #[error("Script not registered: {0}")]
    NotRegistered(String),

    #[error("Script already registered: {0}")]
    AlreadyRegistered(String),

    #[error("No backing connection configured")]
    Uninitialized,

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    /// Error reply text from the store, unclassified.
    #[error("Store error: {0}")]
    Store(String),

    // -------------------------------------------------------------------------
    // I/O and Network Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScriptKvError {
    /// Shorthand for a store error reply
    pub fn store(message: impl Into<String>) -> Self {
        ScriptKvError::Store(message.into())
    }

    /// True for I/O failures that leave a connection unusable
    pub fn is_io(&self) -> bool {
        matches!(self, ScriptKvError::Io(_) | ScriptKvError::Protocol(_))
    }
}
