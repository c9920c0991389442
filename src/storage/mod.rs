//! Typed keyspace and expiration.
//!
//! The keyspace is one map from key to a tagged value (string, list,
//! hash, or set) with an optional expiry instant, guarded by a single
//! readers-writer lock:
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                    Store                      │
//! │        RwLock<HashMap<Bytes, Entry>>          │
//! │   Entry = StoredValue + Option<Instant>       │
//! └───────────────────────────────────────────────┘
//!            ▲                        ▲
//!            │ shared (reads)         │ exclusive (writes)
//!     connection tasks         connection tasks + Sweeper
//! ```
//!
//! Expired keys are invisible to every operation from the moment their
//! instant passes; the [`Sweeper`] reclaims their memory on a fixed tick.

pub mod expiry;
pub mod store;

pub use expiry::{Sweeper, SWEEP_INTERVAL};
pub use store::{Entry, NotFoundError, Store, StoredValue, WrongTypeError};
