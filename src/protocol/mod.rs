//! Protocol Module
//!
//! Defines the wire protocol spoken with the store (RESP, as used by Redis).
//!
//! ### Request Format
//! ```text
//! ┌────────────┬───────────────┬───────────────┬─────┐
//! │ *<argc>    │ $<len> cmd    │ $<len> arg 1  │ ... │
//! └────────────┴───────────────┴───────────────┴─────┘
//! ```
//!
//! ### Reply Types
//! - `+` status
//! - `-` error (surfaced as `ScriptKvError::Store`)
//! - `:` integer
//! - `$` bulk string (nil when length is -1)
//! - `*` array

mod arg;
mod codec;
mod reply;

pub use arg::{arg, ToArg};
pub use codec::{
    encode_command, encode_error, encode_reply, read_command, read_reply, write_command,
    write_error, write_reply, MAX_ARRAY_LEN, MAX_BULK_LEN,
};
pub use reply::Reply;
