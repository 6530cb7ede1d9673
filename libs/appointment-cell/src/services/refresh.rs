// libs/appointment-cell/src/services/refresh.rs
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Signals listening views that appointment state changed underneath them.
///
/// Two sources feed the signal: lifecycle operations fire it directly, and a
/// background poll loop fires it on an interval. The poll loop consults a
/// suppress flag so an in-progress edit (an input control holding focus) is
/// never clobbered by a reload.
pub struct RefreshCoordinator {
    suppressed: AtomicBool,
    tx: watch::Sender<u64>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            suppressed: AtomicBool::new(false),
            tx,
        }
    }

    /// Subscribe to refresh ticks. Receivers see a monotonically increasing
    /// generation counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    /// Fire a refresh tick immediately (used after approve/decline/complete).
    pub fn signal(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }

    pub fn set_suppressed(&self, suppressed: bool) {
        debug!("Background refresh suppressed: {}", suppressed);
        self.suppressed.store(suppressed, Ordering::SeqCst);
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst)
    }

    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Periodic refresh ticks, skipped while suppressed.
    pub fn spawn_poll_loop(coordinator: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; skip it so subscribers only
            // see real refreshes.
            interval.tick().await;
            loop {
                interval.tick().await;
                if coordinator.is_suppressed() {
                    debug!("Skipping background refresh tick (suppressed)");
                    continue;
                }
                coordinator.signal();
            }
        })
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
