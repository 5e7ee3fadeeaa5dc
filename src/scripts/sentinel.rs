//! Sentinel phrases
//!
//! Fixed substrings raised by the embedded programs' failure paths. The
//! translator classifies store errors by looking for these, so the program
//! bodies and the translator must agree on them. Both read them from here.
//!
//! Changing a phrase is a wire-visible change: bump
//! [`SCRIPT_SET_VERSION`](super::SCRIPT_SET_VERSION) with it.

// Literal forms, usable inside `concat!` when building program bodies.
macro_rules! insufficient {
    () => {
        "error insufficient"
    };
}

macro_rules! value_mismatch {
    () => {
        "val not match"
    };
}

macro_rules! lock_occupied {
    () => {
        "lock occupied"
    };
}

pub(crate) use insufficient;
pub(crate) use value_mismatch;

/// Raised when a decrement would cross zero
pub const INSUFFICIENT: &str = insufficient!();

/// Raised when a compare-and-* finds a different value
pub const VALUE_MISMATCH: &str = value_mismatch!();

/// Reserved for lease contention raised by programs
///
/// `lock` itself detects contention from the nil reply of `SET NX`, so no
/// built-in program raises this today.
pub const LOCK_OCCUPIED: &str = lock_occupied!();

/// All sentinels, in the order the translator checks them
pub const ALL: [&str; 3] = [INSUFFICIENT, VALUE_MISMATCH, LOCK_OCCUPIED];
