//! Client connection management.
//!
//! The listener hands each accepted socket to its own task; the task
//! owns a buffered reader on the socket and a clone of the shared
//! command handler, and loops read, parse, dispatch, reply until the
//! client goes away or breaks framing. One connection's failure never
//! touches another: tasks are isolated by `tokio::spawn`, so even a
//! panicking handler aborts only its own connection.

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, InputMode};
