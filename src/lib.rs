//! # FluxKV - An In-Memory Key-Value Server
//!
//! FluxKV is a Redis-compatible in-memory key-value server speaking the
//! RESP2 wire protocol. Clients open persistent TCP connections, send
//! command arrays, and receive typed replies. Keys hold one of four
//! value kinds (string, list, hash, set) with optional per-key
//! expiration.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            FluxKV                               │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐          │
//! │  │   Server    │───>│ Connection  │───>│  Command    │          │
//! │  │ (accept +   │    │  Handler    │    │  Handler    │          │
//! │  │  drain)     │    │             │    │             │          │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘          │
//! │                           │                   │                 │
//! │                    ┌──────▼──────┐     ┌──────▼──────────────┐  │
//! │                    │ RESP parser │     │       Store         │  │
//! │                    │ + serializer│     │ RwLock<HashMap<...>>│  │
//! │                    └─────────────┘     └──────────▲──────────┘  │
//! │                                                   │             │
//! │                                        ┌──────────┴──────────┐  │
//! │                                        │       Sweeper       │  │
//! │                                        │ (background task)   │  │
//! │                                        └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bytes flow: socket -> parser -> command array -> dispatch -> store
//! operation -> reply frame -> serializer -> socket. Each connection is
//! an independent task; the store is the single piece of shared state,
//! guarded by one readers-writer lock.
//!
//! ## Module overview
//!
//! - [`protocol`]: RESP frame types, incremental parser, serializer,
//!   and the optional human-line input mode
//! - [`storage`]: the typed keyspace with TTL support and the
//!   background expiration sweeper
//! - [`commands`]: the dispatch table translating request arrays into
//!   store operations and reply frames
//! - [`connection`]: the per-client read-parse-dispatch-write loop
//! - [`server`]: the accept loop with connection tracking and graceful
//!   drain
//!
//! ## Expiry
//!
//! Keys with a TTL expire in two ways:
//! 1. Logically: every access path treats a past-expiry key as absent
//! 2. Physically: a background sweeper removes expired entries on a
//!    fixed tick
//!
//! The first makes expiry exact from the client's point of view; the
//! second bounds the memory held by keys nobody reads again.

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionError, InputMode};
pub use protocol::{Frame, FrameParser, ProtocolError};
pub use server::{DrainError, Server};
pub use storage::{NotFoundError, Store, Sweeper, WrongTypeError};

/// The default port FluxKV listens on.
pub const DEFAULT_PORT: u16 = 6380;

/// The default host FluxKV binds to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of FluxKV.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
