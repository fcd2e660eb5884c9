//! Background retry queue.
//!
//! Failed mutating requests are captured into a durable FIFO and replayed
//! oldest first when connectivity returns. Replay stops at the first task
//! that still cannot be delivered so that later tasks never overtake it;
//! tasks older than the retention window are dropped and replay moves on.
//! Delivery is at-least-once: a request whose response was lost may reach
//! the server twice.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use waystation_core::cache::parse_timestamp;
use waystation_core::{CacheDb, Error, RetryTask};

use crate::fetch::Network;
use crate::request::Request;

/// Outcome of one [`RetryQueue::replay_all`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Tasks delivered and removed.
    pub replayed: usize,
    /// Tasks dropped for exceeding the retention window.
    pub expired: usize,
    /// Tasks still waiting.
    pub remaining: u64,
    /// Replay stopped at an undeliverable task.
    pub stalled: bool,
}

#[derive(Debug)]
pub struct RetryQueue {
    name: String,
    db: CacheDb,
    retention: Duration,
    replay: Mutex<()>,
}

impl RetryQueue {
    pub fn new(db: CacheDb, name: &str, retention: Duration) -> Self {
        Self { name: name.to_string(), db, retention, replay: Mutex::new(()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a request to the tail of the queue.
    pub async fn push_request(&self, request: &Request) -> Result<i64, Error> {
        let id = self.db.push_retry_task(&self.name, &request.snapshot()).await?;
        tracing::info!(queue = %self.name, id, method = %request.method, url = %request.url, "request queued for replay");
        Ok(id)
    }

    pub async fn len(&self) -> Result<u64, Error> {
        self.db.count_retry_tasks(&self.name).await
    }

    pub async fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len().await? == 0)
    }

    /// Waiting tasks in replay order.
    pub async fn tasks(&self) -> Result<Vec<RetryTask>, Error> {
        self.db.list_retry_tasks(&self.name).await
    }

    fn check_retention(&self, task: &RetryTask) -> Result<(), Error> {
        let enqueued_at = parse_timestamp(&task.enqueued_at)?;
        let deadline = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|retention| enqueued_at.checked_add_signed(retention));
        if deadline.is_some_and(|deadline| deadline < Utc::now()) {
            return Err(Error::QueueRetentionExpired(format!("{} {} (task {})", task.method, task.url, task.id)));
        }
        Ok(())
    }

    /// Resubmit queued requests, oldest first.
    ///
    /// Concurrent calls are serialized. Any HTTP response counts as
    /// delivered; a transport error stops the run and keeps the task at the
    /// head of the queue.
    pub async fn replay_all(&self, network: &dyn Network) -> Result<ReplayReport, Error> {
        let _guard = self.replay.lock().await;
        let mut report = ReplayReport::default();

        while let Some(task) = self.db.oldest_retry_task(&self.name).await? {
            if let Err(e) = self.check_retention(&task) {
                tracing::debug!(queue = %self.name, error = %e, "dropping retry task");
                self.db.delete_retry_task(task.id).await?;
                report.expired += 1;
                continue;
            }

            let request = match Request::from_task(&task) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(queue = %self.name, id = task.id, error = %e, "dropping unreadable retry task");
                    self.db.delete_retry_task(task.id).await?;
                    continue;
                }
            };

            match network.fetch(&request).await {
                Ok(response) => {
                    tracing::debug!(queue = %self.name, id = task.id, status = response.status, "replayed");
                    self.db.delete_retry_task(task.id).await?;
                    report.replayed += 1;
                }
                Err(e) => {
                    tracing::debug!(queue = %self.name, id = task.id, error = %e, "replay stalled");
                    report.stalled = true;
                    break;
                }
            }
        }

        report.remaining = self.len().await?;
        if report.replayed > 0 || report.expired > 0 {
            tracing::info!(
                queue = %self.name,
                replayed = report.replayed,
                expired = report.expired,
                remaining = report.remaining,
                "retry queue replayed"
            );
        }
        Ok(report)
    }
}
