//! Keep-alive tracking for work that outlives the event that started it.
//!
//! Background refreshes, expiration enforcement and queue replays register
//! here; the host awaits [`KeepAlive::settled`] before shutting down.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::{JoinError, JoinSet};
use waystation_core::Error;

#[derive(Clone, Debug, Default)]
pub struct KeepAlive {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl KeepAlive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` in the background and keep the agent alive until it ends.
    ///
    /// Failures are logged; they never reach the request that scheduled them.
    pub fn wait_until<F>(&self, label: &'static str, work: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        reap(&mut tasks);
        tasks.spawn(async move {
            if let Err(e) = work.await {
                tracing::warn!(task = label, error = %e, "background work failed");
            }
        });
    }

    /// Number of registered tasks still running.
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        reap(&mut tasks);
        tasks.len()
    }

    /// Wait until every registered task, including tasks registered while
    /// waiting, has finished.
    pub async fn settled(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
            if batch.is_empty() {
                return;
            }
            while let Some(joined) = batch.join_next().await {
                log_join(joined);
            }
        }
    }
}

/// Drop finished tasks without waiting for running ones.
fn reap(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.try_join_next() {
        log_join(joined);
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        tracing::warn!(error = %e, "background task panicked or was cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_settled_waits_for_work() {
        let keep_alive = KeepAlive::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let done = done.clone();
            keep_alive.wait_until("count", async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        keep_alive.settled().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(keep_alive.pending(), 0);
    }

    #[tokio::test]
    async fn test_settled_includes_nested_work() {
        let keep_alive = KeepAlive::new();
        let done = Arc::new(AtomicUsize::new(0));

        let inner = keep_alive.clone();
        let counter = done.clone();
        keep_alive.wait_until("outer", async move {
            inner.wait_until("inner", async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        keep_alive.settled().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finished_work_is_released() {
        let keep_alive = KeepAlive::new();
        for _ in 0..100 {
            keep_alive.wait_until("quick", async { Ok(()) });
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(keep_alive.pending(), 0);

        keep_alive.wait_until("slow", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        });
        assert_eq!(keep_alive.pending(), 1);
        keep_alive.settled().await;
        assert_eq!(keep_alive.pending(), 0);
    }

    #[tokio::test]
    async fn test_failed_work_is_contained() {
        let keep_alive = KeepAlive::new();
        keep_alive.wait_until("fails", async { Err(Error::NetworkFailure("offline".into())) });
        keep_alive.settled().await;
        assert_eq!(keep_alive.pending(), 0);
    }
}
