//! Command dispatch.
//!
//! A request arrives as a parsed RESP array whose first element is the
//! command name as a bulk string. The handler case-folds the name,
//! dispatches to the matching `cmd_*` method, and each method performs
//! the same sequence: arity check, argument kind check, numeric decode,
//! store call, reply shaping.
//!
//! ## Error mapping
//!
//! - Wrong-kind store failures become the fixed
//!   `WRONGTYPE Operation against a key holding the wrong kind of value`
//!   reply.
//! - Absent keys become neutral replies (null bulk, 0, or an empty
//!   array) everywhere except RENAME/RENAMENX, which reply
//!   `ERR no such key`.
//! - Usage errors (arity, argument kinds, bad integers, unknown
//!   options, unknown commands) become `ERR ...` replies; the connection
//!   stays open.

use crate::protocol::Frame;
use crate::storage::{NotFoundError, Store, WrongTypeError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The fixed reply for operations against a key of the wrong kind.
const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// Executes commands against the shared store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    store: Arc<Store>,
}

impl CommandHandler {
    /// Creates a handler over the given store.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Executes one request frame and returns the reply frame.
    pub fn execute(&self, request: Frame) -> Frame {
        let args = match request {
            Frame::Array(args) => args,
            _ => return Frame::error("ERR request must be an array of bulk strings"),
        };

        // an empty request array is acknowledged with an empty array
        if args.is_empty() {
            return Frame::Array(Vec::new());
        }

        let name = match &args[0] {
            Frame::Bulk(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            _ => return Frame::error("ERR command must be a bulk string"),
        };

        self.dispatch(&name, &args[1..])
    }

    fn dispatch(&self, name: &str, args: &[Frame]) -> Frame {
        match name.to_uppercase().as_str() {
            "PING" => self.cmd_ping(args),
            "COMMAND" => self.cmd_command(args),

            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "DEL" => self.cmd_del(args),
            "EXISTS" => self.cmd_exists(args),
            "TTL" => self.cmd_ttl(args),
            "EXPIRE" => self.cmd_expire(args),
            "TYPE" => self.cmd_type(args),
            "RENAME" => self.cmd_rename(args),
            "RENAMENX" => self.cmd_renamenx(args),

            "LPUSH" => self.cmd_push(args, "lpush"),
            "RPUSH" => self.cmd_push(args, "rpush"),
            "LPOP" => self.cmd_pop(args, "lpop"),
            "RPOP" => self.cmd_pop(args, "rpop"),
            "LRANGE" => self.cmd_lrange(args),
            "LLEN" => self.cmd_llen(args),

            "HSET" => self.cmd_hset(args),
            "HGET" => self.cmd_hget(args),
            "HGETALL" => self.cmd_hgetall(args),
            "HDEL" => self.cmd_hdel(args),
            "HEXISTS" => self.cmd_hexists(args),
            "HLEN" => self.cmd_hlen(args),

            "SADD" => self.cmd_sadd(args),
            "SREM" => self.cmd_srem(args),
            "SISMEMBER" => self.cmd_sismember(args),
            "SMEMBERS" => self.cmd_smembers(args),
            "SCARD" => self.cmd_scard(args),
            "SINTER" => self.cmd_sinter(args),

            _ => {
                debug!(command = name, "unknown command");
                Frame::error(format!("ERR unknown command '{}'", name))
            }
        }
    }

    // ========================================================================
    // Server commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[Frame]) -> Frame {
        match args {
            [] => Frame::pong(),
            [Frame::Bulk(msg)] => Frame::Bulk(msg.clone()),
            [Frame::Integer(n)] => Frame::Integer(*n),
            [_] => Frame::error("ERR arguments should be bulk strings"),
            _ => arity_error("ping"),
        }
    }

    /// COMMAND - handshake stub, clients expect some array back.
    fn cmd_command(&self, _args: &[Frame]) -> Frame {
        Frame::Array(Vec::new())
    }

    // ========================================================================
    // String commands
    // ========================================================================

    /// SET key value [EX seconds | PX milliseconds]
    fn cmd_set(&self, args: &[Frame]) -> Frame {
        if args.len() < 2 {
            return arity_error("set");
        }

        let (key, value) = match (bulk(&args[0]), bulk(&args[1])) {
            (Some(k), Some(v)) => (k.clone(), v.clone()),
            _ => return Frame::error("ERR arguments should be bulk strings"),
        };

        let ttl = match args.len() {
            2 => None,
            4 => {
                let flag = match bulk(&args[2]) {
                    Some(f) => String::from_utf8_lossy(f).to_uppercase(),
                    None => {
                        return Frame::error("ERR expiration flag and value must be bulk strings")
                    }
                };
                let n = match int_arg(&args[3]) {
                    Some(n) if n > 0 => n as u64,
                    _ => return Frame::error("ERR value is not an integer or out of range"),
                };
                match flag.as_str() {
                    "EX" => Some(Duration::from_secs(n)),
                    "PX" => Some(Duration::from_millis(n)),
                    _ => return Frame::error("ERR unsupported option"),
                }
            }
            _ => return arity_error("set"),
        };

        self.store.set(key, value, ttl);
        Frame::ok()
    }

    /// GET key
    fn cmd_get(&self, args: &[Frame]) -> Frame {
        let [key] = args else {
            return arity_error("get");
        };
        let Some(key) = bulk(key) else {
            return Frame::error("ERR argument should be a bulk string");
        };

        match self.store.get(key) {
            Ok(Some(value)) => Frame::Bulk(value),
            Ok(None) => Frame::NullBulk,
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    /// DEL key [key ...]
    fn cmd_del(&self, args: &[Frame]) -> Frame {
        if args.is_empty() {
            return arity_error("del");
        }
        let Some(keys) = bulk_args(args) else {
            return Frame::error("ERR arguments should be bulk strings");
        };
        Frame::integer(self.store.del(&keys) as i64)
    }

    /// EXISTS key [key ...]
    fn cmd_exists(&self, args: &[Frame]) -> Frame {
        if args.is_empty() {
            return arity_error("exists");
        }
        let Some(keys) = bulk_args(args) else {
            return Frame::error("ERR arguments should be bulk strings");
        };
        Frame::integer(self.store.exists(&keys) as i64)
    }

    /// TTL key
    fn cmd_ttl(&self, args: &[Frame]) -> Frame {
        let [key] = args else {
            return arity_error("ttl");
        };
        let Some(key) = bulk(key) else {
            return Frame::error("ERR argument should be a bulk string");
        };
        Frame::integer(self.store.ttl(key))
    }

    /// EXPIRE key seconds
    fn cmd_expire(&self, args: &[Frame]) -> Frame {
        let [key, seconds] = args else {
            return arity_error("expire");
        };
        let Some(key) = bulk(key) else {
            return Frame::error("ERR argument should be a bulk string");
        };
        let seconds = match int_arg(seconds) {
            Some(n) if n > 0 => n as u64,
            _ => return Frame::error("ERR value is not an integer or out of range"),
        };

        let attached = self.store.expire(key, Duration::from_secs(seconds));
        Frame::integer(attached as i64)
    }

    /// TYPE key
    fn cmd_type(&self, args: &[Frame]) -> Frame {
        let [key] = args else {
            return arity_error("type");
        };
        let Some(key) = bulk(key) else {
            return Frame::error("ERR argument should be a bulk string");
        };
        Frame::bulk(Bytes::from_static(self.store.key_type(key).as_bytes()))
    }

    /// RENAME key newkey
    fn cmd_rename(&self, args: &[Frame]) -> Frame {
        let [src, dst] = args else {
            return arity_error("rename");
        };
        let (Some(src), Some(dst)) = (bulk(src), bulk(dst)) else {
            return Frame::error("ERR arguments should be bulk strings");
        };

        match self.store.rename(src, dst) {
            Ok(()) => Frame::ok(),
            Err(NotFoundError) => Frame::error("ERR no such key"),
        }
    }

    /// RENAMENX key newkey
    fn cmd_renamenx(&self, args: &[Frame]) -> Frame {
        let [src, dst] = args else {
            return arity_error("renamenx");
        };
        let (Some(src), Some(dst)) = (bulk(src), bulk(dst)) else {
            return Frame::error("ERR arguments should be bulk strings");
        };

        match self.store.rename_nx(src, dst) {
            Ok(moved) => Frame::integer(moved as i64),
            Err(NotFoundError) => Frame::error("ERR no such key"),
        }
    }

    // ========================================================================
    // List commands
    // ========================================================================

    /// LPUSH/RPUSH key value [value ...]
    fn cmd_push(&self, args: &[Frame], name: &str) -> Frame {
        if args.len() < 2 {
            return arity_error(name);
        }
        let Some(mut parts) = bulk_args(args) else {
            return Frame::error("ERR arguments should be bulk strings");
        };
        let key = parts.remove(0);

        let result = if name == "lpush" {
            self.store.lpush(key, parts)
        } else {
            self.store.rpush(key, parts)
        };

        match result {
            Ok(len) => Frame::integer(len as i64),
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    /// LPOP/RPOP key
    fn cmd_pop(&self, args: &[Frame], name: &str) -> Frame {
        let [key] = args else {
            return arity_error(name);
        };
        let Some(key) = bulk(key) else {
            return Frame::error("ERR argument should be a bulk string");
        };

        let result = if name == "lpop" {
            self.store.lpop(key)
        } else {
            self.store.rpop(key)
        };

        match result {
            Ok(Some(value)) => Frame::Bulk(value),
            Ok(None) => Frame::NullBulk,
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    /// LRANGE key start stop
    fn cmd_lrange(&self, args: &[Frame]) -> Frame {
        let [key, start, stop] = args else {
            return arity_error("lrange");
        };
        let Some(key) = bulk(key) else {
            return Frame::error("ERR argument should be a bulk string");
        };
        let (Some(start), Some(stop)) = (int_arg(start), int_arg(stop)) else {
            return Frame::error("ERR value is not an integer or out of range");
        };

        match self.store.lrange(key, start, stop) {
            Ok(elements) => Frame::Array(elements.into_iter().map(Frame::Bulk).collect()),
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    /// LLEN key
    fn cmd_llen(&self, args: &[Frame]) -> Frame {
        let [key] = args else {
            return arity_error("llen");
        };
        let Some(key) = bulk(key) else {
            return Frame::error("ERR argument should be a bulk string");
        };

        match self.store.llen(key) {
            Ok(len) => Frame::integer(len as i64),
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    // ========================================================================
    // Hash commands
    // ========================================================================

    /// HSET key field value [field value ...]
    fn cmd_hset(&self, args: &[Frame]) -> Frame {
        // a key plus one or more field/value pairs
        if args.len() < 3 || args.len() % 2 == 0 {
            return arity_error("hset");
        }
        let Some(mut parts) = bulk_args(args) else {
            return Frame::error("ERR arguments should be bulk strings");
        };
        let key = parts.remove(0);
        let pairs = parts
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();

        match self.store.hset(key, pairs) {
            Ok(created) => Frame::integer(created as i64),
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    /// HGET key field
    fn cmd_hget(&self, args: &[Frame]) -> Frame {
        let [key, field] = args else {
            return arity_error("hget");
        };
        let (Some(key), Some(field)) = (bulk(key), bulk(field)) else {
            return Frame::error("ERR arguments should be bulk strings");
        };

        match self.store.hget(key, field) {
            Ok(Some(value)) => Frame::Bulk(value),
            Ok(None) => Frame::NullBulk,
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    /// HGETALL key
    fn cmd_hgetall(&self, args: &[Frame]) -> Frame {
        let [key] = args else {
            return arity_error("hgetall");
        };
        let Some(key) = bulk(key) else {
            return Frame::error("ERR argument should be a bulk string");
        };

        match self.store.hgetall(key) {
            Ok(flat) => Frame::Array(flat.into_iter().map(Frame::Bulk).collect()),
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    /// HDEL key field [field ...]
    fn cmd_hdel(&self, args: &[Frame]) -> Frame {
        if args.len() < 2 {
            return arity_error("hdel");
        }
        let Some(mut parts) = bulk_args(args) else {
            return Frame::error("ERR arguments should be bulk strings");
        };
        let key = parts.remove(0);

        match self.store.hdel(&key, &parts) {
            Ok(removed) => Frame::integer(removed as i64),
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    /// HEXISTS key field
    fn cmd_hexists(&self, args: &[Frame]) -> Frame {
        let [key, field] = args else {
            return arity_error("hexists");
        };
        let (Some(key), Some(field)) = (bulk(key), bulk(field)) else {
            return Frame::error("ERR arguments should be bulk strings");
        };

        match self.store.hexists(key, field) {
            Ok(found) => Frame::integer(found as i64),
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    /// HLEN key
    fn cmd_hlen(&self, args: &[Frame]) -> Frame {
        let [key] = args else {
            return arity_error("hlen");
        };
        let Some(key) = bulk(key) else {
            return Frame::error("ERR argument should be a bulk string");
        };

        match self.store.hlen(key) {
            Ok(len) => Frame::integer(len as i64),
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    // ========================================================================
    // Set commands
    // ========================================================================

    /// SADD key member [member ...]
    fn cmd_sadd(&self, args: &[Frame]) -> Frame {
        if args.len() < 2 {
            return arity_error("sadd");
        }
        let Some(mut parts) = bulk_args(args) else {
            return Frame::error("ERR arguments should be bulk strings");
        };
        let key = parts.remove(0);

        match self.store.sadd(key, parts) {
            Ok(added) => Frame::integer(added as i64),
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    /// SREM key member [member ...]
    fn cmd_srem(&self, args: &[Frame]) -> Frame {
        if args.len() < 2 {
            return arity_error("srem");
        }
        let Some(mut parts) = bulk_args(args) else {
            return Frame::error("ERR arguments should be bulk strings");
        };
        let key = parts.remove(0);

        match self.store.srem(&key, &parts) {
            Ok(removed) => Frame::integer(removed as i64),
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    /// SISMEMBER key member
    fn cmd_sismember(&self, args: &[Frame]) -> Frame {
        let [key, member] = args else {
            return arity_error("sismember");
        };
        let (Some(key), Some(member)) = (bulk(key), bulk(member)) else {
            return Frame::error("ERR arguments should be bulk strings");
        };

        match self.store.sismember(key, member) {
            Ok(found) => Frame::integer(found as i64),
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    /// SMEMBERS key
    fn cmd_smembers(&self, args: &[Frame]) -> Frame {
        let [key] = args else {
            return arity_error("smembers");
        };
        let Some(key) = bulk(key) else {
            return Frame::error("ERR argument should be a bulk string");
        };

        match self.store.smembers(key) {
            Ok(members) => Frame::Array(members.into_iter().map(Frame::Bulk).collect()),
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    /// SCARD key
    fn cmd_scard(&self, args: &[Frame]) -> Frame {
        let [key] = args else {
            return arity_error("scard");
        };
        let Some(key) = bulk(key) else {
            return Frame::error("ERR argument should be a bulk string");
        };

        match self.store.scard(key) {
            Ok(len) => Frame::integer(len as i64),
            Err(WrongTypeError) => Frame::error(WRONGTYPE),
        }
    }

    /// SINTER key [key ...]
    fn cmd_sinter(&self, args: &[Frame]) -> Frame {
        if args.is_empty() {
            return arity_error("sinter");
        }
        let Some(keys) = bulk_args(args) else {
            return Frame::error("ERR arguments should be bulk strings");
        };

        let members = self.store.sinter(&keys);
        Frame::Array(members.into_iter().map(Frame::Bulk).collect())
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

/// The bytes of a bulk-string argument, if it is one.
fn bulk(frame: &Frame) -> Option<&Bytes> {
    match frame {
        Frame::Bulk(bytes) => Some(bytes),
        _ => None,
    }
}

/// Collects all arguments as bulk strings. Returns `None` if any
/// argument is of another kind.
fn bulk_args(args: &[Frame]) -> Option<Vec<Bytes>> {
    args.iter().map(|frame| bulk(frame).cloned()).collect()
}

/// Decodes a bulk-string argument as a signed decimal integer.
fn int_arg(frame: &Frame) -> Option<i64> {
    let bytes = bulk(frame)?;
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn arity_error(name: &str) -> Frame {
    Frame::error(format!(
        "ERR wrong number of arguments for '{}' command",
        name
    ))
}
