//! Graceful shutdown coordination
//!
//! One coordinator per process: the signal handler calls [`ShutdownCoordinator::signal`],
//! long-lived tasks watch for it, and the main loop drains in-flight work under
//! a hard deadline before tearing down shared clients.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Coordinates graceful shutdown between the dispatcher and in-flight work.
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
    active: AtomicU32,
}

impl ShutdownCoordinator {
    pub fn new() -> Arc<Self> {
        let (tx, _) = watch::channel(false);
        Arc::new(Self {
            tx,
            active: AtomicU32::new(0),
        })
    }

    /// Subscribe to the shutdown signal. The receiver yields `true` once
    /// shutdown has been requested.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        *self.tx.borrow()
    }

    /// Register one unit of in-flight work.
    pub fn task_started(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    /// Mark one unit of in-flight work complete.
    pub fn task_completed(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of in-flight units.
    pub fn active_tasks(&self) -> u32 {
        self.active.load(Ordering::SeqCst)
    }

    /// Request shutdown. Idempotent.
    pub fn signal(&self) {
        if !self.tx.send_replace(true) {
            info!("shutdown requested");
        }
    }

    /// Wait until all in-flight work completes or `deadline` elapses.
    /// Returns `true` when fully drained.
    pub async fn drain(&self, deadline: Duration) -> bool {
        let start = tokio::time::Instant::now();

        while start.elapsed() < deadline {
            if self.active_tasks() == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if self.active_tasks() == 0 {
            return true;
        }
        warn!(
            remaining = self.active_tasks(),
            "drain deadline elapsed, abandoning residual work"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_and_drain() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());

        coord.task_started();
        coord.task_started();
        assert_eq!(coord.active_tasks(), 2);

        coord.signal();
        assert!(coord.is_shutting_down());

        let coord_clone = coord.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            coord_clone.task_completed();
            coord_clone.task_completed();
        });

        assert!(coord.drain(Duration::from_secs(5)).await);
        assert_eq!(coord.active_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_deadline() {
        let coord = ShutdownCoordinator::new();
        coord.task_started();
        coord.signal();

        // Task never completes; drain must give up at the deadline.
        assert!(!coord.drain(Duration::from_secs(30)).await);
        assert_eq!(coord.active_tasks(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_sees_signal() {
        let coord = ShutdownCoordinator::new();
        let mut rx = coord.subscribe();
        assert!(!*rx.borrow());

        coord.signal();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_signal_is_idempotent() {
        let coord = ShutdownCoordinator::new();
        coord.signal();
        coord.signal();
        assert!(coord.is_shutting_down());
    }
}
