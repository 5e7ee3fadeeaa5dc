//! Error Translator
//!
//! Classifies store error text into the typed taxonomy.
//!
//! The store only ever reports script failures as text, usually wrapped in a
//! prefix naming the script and line. Classification is by substring, so the
//! wrapping does not matter. The flip side: an unrelated store error whose
//! text happens to contain a sentinel phrase is misclassified. Keep the
//! phrases in [`sentinel`] distinctive.

use crate::error::ScriptKvError;
use crate::scripts::sentinel;

/// Error code the store uses when a content hash is not in its script cache
pub const NOSCRIPT_CODE: &str = "NOSCRIPT";

/// Map a raw store error onto a typed error
///
/// Only `ScriptKvError::Store` is inspected. Anything else, and store text
/// without a known sentinel, is returned unchanged.
pub fn translate(err: ScriptKvError) -> ScriptKvError {
    let message = match &err {
        ScriptKvError::Store(message) => message,
        _ => return err,
    };

    // First phrase in `sentinel::ALL` order wins.
    match sentinel::ALL
        .into_iter()
        .find(|phrase| message.contains(phrase))
    {
        Some(sentinel::INSUFFICIENT) => ScriptKvError::Insufficient,
        Some(sentinel::VALUE_MISMATCH) => ScriptKvError::ValueMismatch,
        Some(sentinel::LOCK_OCCUPIED) => ScriptKvError::LockOccupied,
        _ => err,
    }
}

/// `translate` lifted over a result
pub fn translate_result<T>(result: Result<T, ScriptKvError>) -> Result<T, ScriptKvError> {
    result.map_err(translate)
}

/// True when the store reports the content hash as unknown
///
/// Only the leading error code counts. A program failure that merely
/// mentions the word is not a cache miss, and must not be run again.
pub fn is_noscript(err: &ScriptKvError) -> bool {
    match err {
        ScriptKvError::Store(message) => {
            message.split_whitespace().next() == Some(NOSCRIPT_CODE)
        }
        _ => false,
    }
}

