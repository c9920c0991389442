//! Command processing layer.
//!
//! Sits between the protocol and the store:
//!
//! ```text
//! parsed request frame
//!        │
//!        ▼
//! ┌─────────────────┐
//! │ CommandHandler  │   arity check
//! │                 │   argument kind check
//! │                 │   numeric decode
//! │                 │   store call
//! │                 │   error mapping
//! └────────┬────────┘
//!          ▼
//!     reply frame
//! ```
//!
//! Recognized commands (case-insensitive): PING, COMMAND, SET, GET, DEL,
//! EXISTS, TTL, EXPIRE, TYPE, RENAME, RENAMENX, LPUSH, RPUSH, LPOP,
//! RPOP, LRANGE, LLEN, HSET, HGET, HGETALL, HDEL, HEXISTS, HLEN, SADD,
//! SREM, SISMEMBER, SMEMBERS, SCARD, SINTER.

pub mod handler;

pub use handler::CommandHandler;
