//! TCP accept loop and graceful shutdown.
//!
//! The listener tracks every accepted connection with a counter that
//! increments on accept and decrements exactly once per connection,
//! enforced by a one-shot flag inside [`ConnGuard`]. On shutdown the
//! accept loop stops (no new connections), and [`ConnTracker::drain`]
//! waits for the counter to reach zero, bounded by a deadline. If the
//! deadline elapses with connections still live, drain reports it and
//! the caller proceeds to exit anyway.

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, InputMode};
use crate::storage::Store;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for in-flight connections.
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

/// Error returned when draining does not finish in time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DrainError {
    /// The deadline elapsed with connections still live.
    #[error("drain deadline exceeded with {0} connections still live")]
    DeadlineExceeded(usize),
}

/// Counts live connections and lets shutdown wait for zero.
#[derive(Debug, Default)]
pub struct ConnTracker {
    live: AtomicUsize,
    drained: Notify,
}

impl ConnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently live connections.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Registers a new connection and returns its guard.
    pub fn register(self: &Arc<Self>) -> ConnGuard {
        self.live.fetch_add(1, Ordering::AcqRel);
        ConnGuard {
            tracker: Arc::clone(self),
            released: AtomicBool::new(false),
        }
    }

    fn release(&self) {
        if self.live.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Waits until every tracked connection has closed, up to `deadline`.
    pub async fn drain(&self, deadline: Duration) -> Result<(), DrainError> {
        let deadline = tokio::time::Instant::now() + deadline;

        loop {
            // register interest before checking, so a release between the
            // check and the await cannot be missed
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.live() == 0 {
                return Ok(());
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(DrainError::DeadlineExceeded(self.live()));
            }
        }
    }
}

/// Decrements the live-connection count exactly once, on explicit
/// [`ConnGuard::release`] or on drop, whichever comes first.
#[derive(Debug)]
pub struct ConnGuard {
    tracker: Arc<ConnTracker>,
    released: AtomicBool,
}

impl ConnGuard {
    /// Releases the guard. Safe to call any number of times.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.tracker.release();
        }
    }
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// The accepting server.
pub struct Server {
    listener: TcpListener,
    store: Arc<Store>,
    tracker: Arc<ConnTracker>,
    mode: InputMode,
    drain_deadline: Duration,
}

impl Server {
    /// Binds the listening socket.
    pub async fn bind(addr: &str, store: Arc<Store>, mode: InputMode) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        info!(addr = %local, "listening");
        Ok(Self {
            listener,
            store,
            tracker: Arc::new(ConnTracker::new()),
            mode,
            drain_deadline: DRAIN_DEADLINE,
        })
    }

    /// Overrides the drain deadline.
    pub fn with_drain_deadline(mut self, deadline: Duration) -> Self {
        self.drain_deadline = deadline;
        self
    }

    /// The bound address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` resolves, then closes the
    /// listener and drains in-flight connections against the deadline.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), DrainError> {
        let Server {
            listener,
            store,
            tracker,
            mode,
            drain_deadline,
        } = self;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let handler = CommandHandler::new(Arc::clone(&store));
                        let guard = tracker.register();
                        tokio::spawn(async move {
                            // held until the connection task finishes,
                            // even if the handler panics
                            let _guard = guard;
                            handle_connection(stream, addr, handler, mode).await;
                        });
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                }
            }
        }

        // stop accepting, then wait for the in-flight connections
        drop(listener);
        let live = tracker.live();
        info!(live, "listener closed, draining connections");

        match tracker.drain(drain_deadline).await {
            Ok(()) => {
                debug!("all connections drained");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "shutdown deadline elapsed");
                Err(e)
            }
        }
    }
}
