//! TCP server: accept loop, connection tracking, graceful drain.

pub mod listener;

pub use listener::{ConnGuard, ConnTracker, DrainError, Server, DRAIN_DEADLINE};
