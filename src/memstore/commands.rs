//! Command dispatch for `MemStore`
//!
//! Error texts follow the store's own wording so that anything parsing them
//! (the translator included) behaves the same against either.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::keyspace::{parse_i64, NOT_INTEGER};
use super::programs::Program;
use super::MemStore;
use crate::error::{Result, ScriptKvError};
use crate::protocol::Reply;

const NOSCRIPT: &str = "NOSCRIPT No matching script. Please use EVAL.";
const SYNTAX: &str = "ERR syntax error";

fn wrong_arity(name: &str) -> ScriptKvError {
    ScriptKvError::Store(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}

fn require(name: &str, args: &[Bytes], min: usize) -> Result<()> {
    if args.len() < min {
        return Err(wrong_arity(name));
    }
    Ok(())
}

fn int_arg(raw: &[u8]) -> Result<i64> {
    parse_i64(raw).ok_or_else(|| ScriptKvError::store(NOT_INTEGER))
}

impl MemStore {
    pub(super) fn dispatch(&self, name: &str, args: &[Bytes]) -> Result<Reply> {
        match name {
            "PING" => Ok(match args.first() {
                Some(message) => Reply::Bulk(message.clone()),
                None => Reply::Status("PONG".to_string()),
            }),
            "GET" => {
                require(name, args, 1)?;
                Ok(self.keyspace.lock().get(&args[0])?.into())
            }
            "SET" => self.set(args),
            "DEL" => {
                require(name, args, 1)?;
                let mut ks = self.keyspace.lock();
                Ok(Reply::Int(args.iter().filter(|k| ks.del(k)).count() as i64))
            }
            "EXISTS" => {
                require(name, args, 1)?;
                let mut ks = self.keyspace.lock();
                Ok(Reply::Int(args.iter().filter(|k| ks.exists(k)).count() as i64))
            }
            "TTL" => {
                require(name, args, 1)?;
                Ok(Reply::Int(self.keyspace.lock().ttl(&args[0])))
            }
            "INCRBY" => {
                require(name, args, 2)?;
                let delta = int_arg(&args[1])?;
                self.keyspace.lock().incr_by(&args[0], delta).map(Reply::Int)
            }
            "HGET" => {
                require(name, args, 2)?;
                Ok(self.keyspace.lock().hget(&args[0], &args[1])?.into())
            }
            "HMGET" => {
                require(name, args, 2)?;
                let values = self.keyspace.lock().hmget(&args[0], &args[1..])?;
                Ok(Reply::Array(values.into_iter().map(Reply::from).collect()))
            }
            "HSET" => {
                if args.len() < 3 || args.len() % 2 == 0 {
                    return Err(wrong_arity(name));
                }
                let pairs = args[1..]
                    .chunks_exact(2)
                    .map(|pair| (pair[0].clone(), pair[1].clone()))
                    .collect();
                let created = self.keyspace.lock().hset(&args[0], pairs)?;
                Ok(Reply::Int(created as i64))
            }
            "HINCRBY" => {
                require(name, args, 3)?;
                let delta = int_arg(&args[2])?;
                self.keyspace
                    .lock()
                    .hincr_by(&args[0], &args[1], delta)
                    .map(Reply::Int)
            }
            "HGETALL" => {
                require(name, args, 1)?;
                let pairs = self.keyspace.lock().hgetall(&args[0])?;
                Ok(Reply::Array(
                    pairs
                        .into_iter()
                        .flat_map(|(f, v)| [Reply::Bulk(f), Reply::Bulk(v)])
                        .collect(),
                ))
            }
            "SCRIPT" => self.script(args),
            "EVAL" => {
                require(name, args, 2)?;
                let body = String::from_utf8_lossy(&args[0]).into_owned();
                let program = self.program_for(&body).ok_or_else(compile_error)?;
                let hash = Self::script_hash(&body);
                self.scripts.write().insert(hash.clone(), Arc::from(body));
                self.run_script(&hash, &program, &args[1..])
            }
            "EVALSHA" => {
                require(name, args, 2)?;
                let hash = String::from_utf8_lossy(&args[0]).to_ascii_lowercase();
                let body = self
                    .scripts
                    .read()
                    .get(&hash)
                    .cloned()
                    .ok_or_else(|| ScriptKvError::store(NOSCRIPT))?;
                let program = self.program_for(&body).ok_or_else(compile_error)?;
                self.run_script(&hash, &program, &args[1..])
            }
            _ => Err(ScriptKvError::Store(format!(
                "ERR unknown command '{}'",
                name.to_ascii_lowercase()
            ))),
        }
    }

    /// `SET key value [NX|XX] [EX seconds|PX milliseconds]`
    fn set(&self, args: &[Bytes]) -> Result<Reply> {
        require("SET", args, 2)?;

        let mut only_if_absent = false;
        let mut only_if_present = false;
        let mut ttl = None;

        let mut options = args[2..].iter();
        while let Some(option) = options.next() {
            match option.to_ascii_uppercase().as_slice() {
                b"NX" => only_if_absent = true,
                b"XX" => only_if_present = true,
                unit @ (b"EX" | b"PX") => {
                    if ttl.is_some() {
                        return Err(ScriptKvError::store(SYNTAX));
                    }
                    let amount = options.next().ok_or_else(|| ScriptKvError::store(SYNTAX))?;
                    let amount = int_arg(amount)?;
                    if amount <= 0 {
                        return Err(ScriptKvError::store(
                            "ERR invalid expire time in 'set' command",
                        ));
                    }
                    ttl = Some(if unit == b"EX" {
                        Duration::from_secs(amount as u64)
                    } else {
                        Duration::from_millis(amount as u64)
                    });
                }
                _ => return Err(ScriptKvError::store(SYNTAX)),
            }
        }
        if only_if_absent && only_if_present {
            return Err(ScriptKvError::store(SYNTAX));
        }

        let mut ks = self.keyspace.lock();
        let exists = ks.exists(&args[0]);
        if (only_if_absent && exists) || (only_if_present && !exists) {
            return Ok(Reply::Nil);
        }
        ks.set(args[0].clone(), args[1].clone(), ttl);
        Ok(Reply::ok())
    }

    /// `SCRIPT LOAD body | EXISTS hash... | FLUSH`
    fn script(&self, args: &[Bytes]) -> Result<Reply> {
        require("SCRIPT", args, 1)?;

        // Exact token match; a padded " EXISTS" is a different subcommand.
        match args[0].to_ascii_uppercase().as_slice() {
            b"LOAD" => {
                require("SCRIPT|LOAD", args, 2)?;
                let body = String::from_utf8_lossy(&args[1]).into_owned();
                if self.program_for(&body).is_none() {
                    return Err(compile_error());
                }
                let hash = Self::script_hash(&body);
                self.scripts.write().insert(hash.clone(), Arc::from(body));
                Ok(Reply::Bulk(Bytes::from(hash)))
            }
            b"EXISTS" => {
                require("SCRIPT|EXISTS", args, 2)?;
                let scripts = self.scripts.read();
                Ok(Reply::Array(
                    args[1..]
                        .iter()
                        .map(|hash| {
                            let hash = String::from_utf8_lossy(hash).to_ascii_lowercase();
                            Reply::Int(scripts.contains_key(&hash) as i64)
                        })
                        .collect(),
                ))
            }
            b"FLUSH" => {
                self.flush_scripts();
                Ok(Reply::ok())
            }
            other => Err(ScriptKvError::Store(format!(
                "ERR unknown subcommand '{}'. Try SCRIPT HELP.",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    /// Split `numkeys key... arg...` and run `program` atomically
    fn run_script(&self, hash: &str, program: &Program, args: &[Bytes]) -> Result<Reply> {
        let numkeys = int_arg(&args[0])?;
        if numkeys < 0 {
            return Err(ScriptKvError::store("ERR Number of keys can't be negative"));
        }
        let numkeys = numkeys as usize;
        let rest = &args[1..];
        if numkeys > rest.len() {
            return Err(ScriptKvError::store(
                "ERR Number of keys can't be greater than number of args",
            ));
        }
        let (keys, argv) = rest.split_at(numkeys);

        let mut ks = self.keyspace.lock();
        program.run(&mut ks, keys, argv).map_err(|err| match err {
            ScriptKvError::Store(message) => ScriptKvError::Store(format!(
                "ERR Error running script (call to f_{}): @user_script: {}",
                hash, message
            )),
            other => other,
        })
    }
}

fn compile_error() -> ScriptKvError {
    ScriptKvError::store("ERR Error compiling script (new function): no native program for this body")
}
