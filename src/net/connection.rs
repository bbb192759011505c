//! Live client-connection accounting.
//!
//! # Responsibilities
//! - Count requests currently inside one `Proxy`'s dispatcher
//! - Guarantee exactly one decrement per increment (RAII guard)
//!
//! # Design Decisions
//! - Best-effort gauge only; never used for admission control
//! - Owned by the `Proxy` instance, not a process global

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Shared live-connection counter. Clones observe the same count.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    live: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more live connection until the returned guard is dropped,
    /// unwinding included.
    pub fn track(&self) -> ConnectionGuard {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_client_connections(live);
        ConnectionGuard {
            live: Arc::clone(&self.live),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.live.load(Ordering::SeqCst)
    }
}

/// One slot of the live count.
#[derive(Debug)]
#[must_use = "the connection is only counted while the guard is alive"]
pub struct ConnectionGuard {
    live: Arc<AtomicU64>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let live = self.live.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_client_connections(live);
        tracing::trace!(live, "Client connection released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_move_the_count() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let first = tracker.track();
        let second = tracker.clone().track();
        assert_eq!(tracker.active_count(), 2);

        drop(first);
        assert_eq!(tracker.active_count(), 1);
        drop(second);
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn guard_released_on_panic() {
        let tracker = ConnectionTracker::new();
        let inner = tracker.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = inner.track();
            panic!("handler blew up");
        });
        assert!(result.is_err());
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_tasks_settle_at_zero() {
        let tracker = ConnectionTracker::new();
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    let _guard = tracker.track();
                    tokio::task::yield_now().await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(tracker.active_count(), 0);
    }
}
