//! Protocol codec
//!
//! Encoding and decoding functions for RESP, the store's wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! *<argc>\r\n
//! $<len>\r\n<command>\r\n
//! $<len>\r\n<arg 1>\r\n
//! ...
//! ```
//!
//! ### Reply Format (first byte selects the type)
//! ```text
//! +OK\r\n                  status
//! -ERR message\r\n         error
//! :42\r\n                  integer
//! $5\r\nhello\r\n          bulk string ($-1 = nil)
//! *2\r\n:1\r\n:2\r\n       array (*-1 = nil)
//! ```

use std::io::{BufRead, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use super::Reply;
use crate::error::{Result, ScriptKvError};

/// Maximum bulk string size (16 MB)
pub const MAX_BULK_LEN: usize = 16 * 1024 * 1024;

/// Maximum number of elements accepted in one array
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

const CRLF: &[u8] = b"\r\n";

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: array of bulk strings, command name first
pub fn encode_command(command: &str, args: &[Bytes]) -> BytesMut {
    let payload: usize = args.iter().map(|a| a.len() + 16).sum();
    let mut buf = BytesMut::with_capacity(command.len() + payload + 32);

    put_header(&mut buf, b'*', args.len() as i64 + 1);
    put_bulk(&mut buf, command.as_bytes());
    for arg in args {
        put_bulk(&mut buf, arg);
    }
    buf
}

/// Read a complete command from a stream
///
/// Returns the command name and its arguments as one vector.
/// Blocks until a complete command is received or an error occurs.
pub fn read_command<R: BufRead>(reader: &mut R) -> Result<Vec<Bytes>> {
    let mut line = Vec::new();
    read_line(reader, &mut line)?;

    let (kind, rest) = split_type(&line)?;
    if kind != b'*' {
        return Err(ScriptKvError::Protocol(format!(
            "expected command array, got type byte 0x{:02x}",
            kind
        )));
    }

    let count = parse_len(rest)?;
    if count < 1 || count as usize > MAX_ARRAY_LEN {
        return Err(ScriptKvError::Protocol(format!(
            "invalid command length: {}",
            count
        )));
    }

    let mut parts = Vec::with_capacity(count as usize);
    for _ in 0..count {
        read_line(reader, &mut line)?;
        let (kind, rest) = split_type(&line)?;
        if kind != b'$' {
            return Err(ScriptKvError::Protocol(
                "command arguments must be bulk strings".to_string(),
            ));
        }
        let len = parse_len(rest)?;
        if len < 0 {
            return Err(ScriptKvError::Protocol(
                "command arguments cannot be nil".to_string(),
            ));
        }
        parts.push(read_bulk_body(reader, len as usize)?);
    }

    Ok(parts)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &str, args: &[Bytes]) -> Result<()> {
    let bytes = encode_command(command, args);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Reply Encoding/Decoding
// =============================================================================

/// Encode a reply to bytes
pub fn encode_reply(reply: &Reply) -> BytesMut {
    let mut buf = BytesMut::with_capacity(64);
    put_reply(&mut buf, reply);
    buf
}

/// Encode an error reply
///
/// Line breaks in the message would end the frame early and are flattened.
pub fn encode_error(message: &str) -> BytesMut {
    let mut buf = BytesMut::with_capacity(message.len() + 3);
    buf.put_u8(b'-');
    for byte in message.bytes() {
        buf.put_u8(if byte == b'\r' || byte == b'\n' { b' ' } else { byte });
    }
    buf.put_slice(CRLF);
    buf
}

/// Read a complete reply from a stream
///
/// An error frame is returned as `ScriptKvError::Store` carrying its text.
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<Reply> {
    let mut line = Vec::new();
    read_line(reader, &mut line)?;

    let (kind, rest) = split_type(&line)?;
    match kind {
        b'+' => Ok(Reply::Status(String::from_utf8_lossy(rest).into_owned())),
        b'-' => Err(ScriptKvError::Store(String::from_utf8_lossy(rest).into_owned())),
        b':' => parse_int(rest).map(Reply::Int),
        b'$' => {
            let len = parse_len(rest)?;
            if len < 0 {
                return Ok(Reply::Nil);
            }
            read_bulk_body(reader, len as usize).map(Reply::Bulk)
        }
        b'*' => {
            let count = parse_len(rest)?;
            if count < 0 {
                return Ok(Reply::Nil);
            }
            if count as usize > MAX_ARRAY_LEN {
                return Err(ScriptKvError::Protocol(format!(
                    "Array too large: {} elements (max {})",
                    count, MAX_ARRAY_LEN
                )));
            }
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(read_reply(reader)?);
            }
            Ok(Reply::Array(items))
        }
        other => Err(ScriptKvError::Protocol(format!(
            "Unknown reply type: 0x{:02x}",
            other
        ))),
    }
}

/// Write a reply to a stream
pub fn write_reply<W: Write>(writer: &mut W, reply: &Reply) -> Result<()> {
    let bytes = encode_reply(reply);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Write an error reply to a stream
pub fn write_error<W: Write>(writer: &mut W, message: &str) -> Result<()> {
    let bytes = encode_error(message);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn put_header(buf: &mut BytesMut, kind: u8, n: i64) {
    buf.put_u8(kind);
    buf.put_slice(n.to_string().as_bytes());
    buf.put_slice(CRLF);
}

fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    put_header(buf, b'$', data.len() as i64);
    buf.put_slice(data);
    buf.put_slice(CRLF);
}

fn put_reply(buf: &mut BytesMut, reply: &Reply) {
    match reply {
        Reply::Nil => buf.put_slice(b"$-1\r\n"),
        Reply::Status(s) => {
            buf.put_u8(b'+');
            buf.put_slice(s.as_bytes());
            buf.put_slice(CRLF);
        }
        Reply::Int(n) => put_header(buf, b':', *n),
        Reply::Bulk(data) => put_bulk(buf, data),
        Reply::Array(items) => {
            put_header(buf, b'*', items.len() as i64);
            for item in items {
                put_reply(buf, item);
            }
        }
    }
}

/// Read one CRLF-terminated line into `line`, without the terminator
fn read_line<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> Result<()> {
    line.clear();
    let n = reader.read_until(b'\n', line)?;
    if n == 0 {
        return Err(ScriptKvError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed",
        )));
    }
    if !line.ends_with(CRLF) {
        return Err(ScriptKvError::Protocol("line not terminated by CRLF".to_string()));
    }
    line.truncate(line.len() - 2);
    Ok(())
}

fn split_type(line: &[u8]) -> Result<(u8, &[u8])> {
    match line.split_first() {
        Some((kind, rest)) => Ok((*kind, rest)),
        None => Err(ScriptKvError::Protocol("empty line".to_string())),
    }
}

fn parse_int(raw: &[u8]) -> Result<i64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            ScriptKvError::Protocol(format!(
                "invalid integer: {:?}",
                String::from_utf8_lossy(raw)
            ))
        })
}

fn parse_len(raw: &[u8]) -> Result<i64> {
    let len = parse_int(raw)?;
    if len < -1 {
        return Err(ScriptKvError::Protocol(format!("invalid length: {}", len)));
    }
    Ok(len)
}

fn read_bulk_body<R: BufRead>(reader: &mut R, len: usize) -> Result<Bytes> {
    if len > MAX_BULK_LEN {
        return Err(ScriptKvError::Protocol(format!(
            "Bulk string too large: {} bytes (max {})",
            len, MAX_BULK_LEN
        )));
    }

    let mut body = vec![0u8; len + 2];
    reader.read_exact(&mut body)?;
    if !body.ends_with(CRLF) {
        return Err(ScriptKvError::Protocol(
            "bulk string not terminated by CRLF".to_string(),
        ));
    }
    body.truncate(len);
    Ok(Bytes::from(body))
}
