//! Background expiration sweeper.
//!
//! Logical expiry is enforced on every access path, but a key that is
//! never touched again would otherwise sit in memory forever. The
//! sweeper is a single long-running task that wakes on a fixed tick,
//! takes the exclusive keyspace lock, and physically removes every
//! entry whose expiry has passed.
//!
//! Shutdown is a one-shot signal carried over a watch channel: the
//! sweeper observes it between ticks and exits. Requesting shutdown
//! more than once is a no-op.

use crate::storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Default interval between sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to the running sweeper task.
///
/// Dropping the handle stops the sweeper.
#[derive(Debug)]
pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl Sweeper {
    /// Spawns the sweeper over the given store.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use fluxkv::storage::{Store, Sweeper, SWEEP_INTERVAL};
    /// use std::sync::Arc;
    ///
    /// let store = Arc::new(Store::new());
    /// let sweeper = Sweeper::start(Arc::clone(&store), SWEEP_INTERVAL);
    /// // ... later
    /// sweeper.stop();
    /// ```
    pub fn start(store: Arc<Store>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(store, interval, shutdown_rx));
        info!(interval_ms = interval.as_millis() as u64, "expiration sweeper started");

        Self { shutdown_tx }
    }

    /// Signals the sweeper to exit. Idempotent; repeated calls are no-ops.
    pub fn stop(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        info!("expiration sweeper stopped");
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(store: Arc<Store>, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("sweeper received shutdown signal");
                    return;
                }
            }
        }

        let removed = store.remove_expired();
        if removed > 0 {
            debug!(removed, remaining = store.len(), "swept expired keys");
        }
    }
}
