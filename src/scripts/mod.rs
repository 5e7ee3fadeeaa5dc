//! Embedded Program Set
//!
//! The five built-in programs that back the atomic primitives. Each one runs
//! on the store as a single indivisible step, so the check and the mutation
//! inside it can never be interleaved with another client's write to the
//! same key.
//!
//! | Name    | Keys | Arguments                  | Result                 |
//! |---------|------|----------------------------|------------------------|
//! | `CAS`   | key  | expected, new              | `OK`                   |
//! | `CAD`   | key  | expected                   | 0 (absent) / 1         |
//! | `HINC`  | key  | field, delta               | new value              |
//! | `INC`   | key  | delta                      | new value              |
//! | `HMINC` | key  | field 1..n, delta 1..n     | new values, in order   |
//!
//! Failure paths raise the phrases in [`sentinel`].

pub mod sentinel;

use sentinel::{insufficient, value_mismatch};

/// Version of the program bodies and sentinel phrases below
pub const SCRIPT_SET_VERSION: u32 = 2;

/// Compare and swap: set when absent or equal to the expected value
pub const CAS_BODY: &str = concat!(
    r#"local current = redis.call("GET", KEYS[1])
if current == false or current == ARGV[1] then
  return redis.call("SET", KEYS[1], ARGV[2])
end
return redis.error_reply(""#,
    value_mismatch!(),
    r#"")
"#
);

/// Compare and delete: no-op when absent, delete when equal
pub const CAD_BODY: &str = concat!(
    r#"local current = redis.call("GET", KEYS[1])
if current == false then
  return 0
end
if current == ARGV[1] then
  return redis.call("DEL", KEYS[1])
end
return redis.error_reply(""#,
    value_mismatch!(),
    r#"")
"#
);

// Strict decimal integer parse shared by the increment bodies. `tonumber`
// alone also takes "2.5", "0x10", "1e3" and padded text.
macro_rules! int_parser {
    () => {
        r#"local function int(raw)
  if type(raw) == "string" and string.match(raw, "^%-?%d+$") then
    return tonumber(raw)
  end
  return nil
end
"#
    };
}

/// Hash field increment that refuses to go below zero
pub const HINC_BODY: &str = concat!(
    int_parser!(),
    r#"local delta = int(ARGV[2])
if delta == nil then
  return redis.error_reply("ERR increment is not an integer")
end
if delta < 0 then
  local raw = redis.call("HGET", KEYS[1], ARGV[1])
  local current = 0
  if raw then
    current = int(raw)
    if current == nil then
      return redis.error_reply("ERR hash value is not an integer")
    end
  end
  if current + delta < 0 then
    return redis.error_reply(""#,
    insufficient!(),
    r#"")
  end
end
return redis.call("HINCRBY", KEYS[1], ARGV[1], ARGV[2])
"#
);

/// String increment that refuses to go below zero
pub const INC_BODY: &str = concat!(
    int_parser!(),
    r#"local delta = int(ARGV[1])
if delta == nil then
  return redis.error_reply("ERR increment is not an integer")
end
if delta < 0 then
  local raw = redis.call("GET", KEYS[1])
  local current = 0
  if raw then
    current = int(raw)
    if current == nil then
      return redis.error_reply("ERR value is not an integer or out of range")
    end
  end
  if current + delta < 0 then
    return redis.error_reply(""#,
    insufficient!(),
    r#"")
  end
end
return redis.call("INCRBY", KEYS[1], ARGV[1])
"#
);

/// Multi-field hash increment, all-or-nothing, refusing to go below zero
///
/// Every field and delta is validated, and every running value checked,
/// before the first write. Writes then go through `HINCRBY` one field at a
/// time, so stored values are computed by the store in exact integer
/// arithmetic. A field named twice accumulates its deltas in argument order.
///
/// The floor and overflow checks run on Lua numbers and are exact while
/// values stay within 2^53.
pub const HMINC_BODY: &str = concat!(
    int_parser!(),
    r#"local n = #ARGV / 2
if n ~= math.floor(n) then
  return redis.error_reply("ERR fields and increments differ in length")
end
if n == 0 then
  return {}
end
local fields = {}
for i = 1, n do
  fields[i] = ARGV[i]
end
local current = redis.call("HMGET", KEYS[1], unpack(fields))
local running = {}
for i = 1, n do
  local delta = int(ARGV[n + i])
  if delta == nil then
    return redis.error_reply("ERR increment is not an integer")
  end
  local base = running[fields[i]]
  if base == nil then
    base = 0
    if current[i] then
      base = int(current[i])
      if base == nil then
        return redis.error_reply("ERR hash value is not an integer")
      end
    end
  end
  local value = base + delta
  if value < 0 then
    return redis.error_reply(""#,
    insufficient!(),
    r#"")
  end
  if value >= 2^63 then
    return redis.error_reply("ERR increment or decrement would overflow")
  end
  running[fields[i]] = value
end
local results = {}
for i = 1, n do
  results[i] = redis.call("HINCRBY", KEYS[1], fields[i], ARGV[n + i])
end
return results
"#
);

/// The built-in programs registered by every `ScriptKv`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Cas,
    Cad,
    HashIncr,
    Incr,
    HashMultiIncr,
}

impl Builtin {
    pub const ALL: [Builtin; 5] = [
        Builtin::Cas,
        Builtin::Cad,
        Builtin::HashIncr,
        Builtin::Incr,
        Builtin::HashMultiIncr,
    ];

    /// Registry name
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Cas => "CAS",
            Builtin::Cad => "CAD",
            Builtin::HashIncr => "HINC",
            Builtin::Incr => "INC",
            Builtin::HashMultiIncr => "HMINC",
        }
    }

    pub fn body(self) -> &'static str {
        match self {
            Builtin::Cas => CAS_BODY,
            Builtin::Cad => CAD_BODY,
            Builtin::HashIncr => HINC_BODY,
            Builtin::Incr => INC_BODY,
            Builtin::HashMultiIncr => HMINC_BODY,
        }
    }

    /// Number of leading arguments that are keys
    pub fn key_count(self) -> usize {
        1
    }

    /// Identify a built-in from its exact body text
    pub fn from_body(body: &str) -> Option<Builtin> {
        Builtin::ALL.into_iter().find(|b| b.body() == body)
    }
}
