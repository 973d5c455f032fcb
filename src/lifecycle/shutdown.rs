//! Shutdown coordination.

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinator for graceful shutdown.
///
/// Every periodic task subscribes; one trigger stops them all.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Trigger shutdown and wait for `tasks` to finish, up to `grace`.
    ///
    /// Returns the number of tasks that were still running at the deadline.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, grace: Duration) -> usize {
        self.trigger();
        let total = tasks.len();
        let mut finished = 0;
        let wait_all = async {
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::error!(error = %e, "Background task failed during shutdown");
                }
                finished += 1;
            }
        };
        if tokio::time::timeout(grace, wait_all).await.is_err() {
            tracing::warn!(
                remaining = total - finished,
                "Shutdown grace period elapsed with tasks still running"
            );
        }
        total - finished
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
