//! Durable retry task rows.
//!
//! Tasks are ordered by their autoincrement id, which gives FIFO order per
//! queue name across restarts.

use std::collections::BTreeMap;

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A captured request waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct RetryTask {
    pub id: i64,
    pub queue_name: String,
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub enqueued_at: String,
}

/// Request snapshot to append to a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRetryTask {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub enqueued_at: String,
}

fn read_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<(RetryTask, String)> {
    Ok((
        RetryTask {
            id: row.get(0)?,
            queue_name: row.get(1)?,
            method: row.get(2)?,
            url: row.get(3)?,
            headers: BTreeMap::new(),
            body: row.get(5)?,
            enqueued_at: row.get(6)?,
        },
        row.get(4)?,
    ))
}

fn decode_headers((mut task, headers_json): (RetryTask, String)) -> Result<RetryTask, Error> {
    task.headers = serde_json::from_str(&headers_json)?;
    Ok(task)
}

impl CacheDb {
    /// Append a task to the tail of a queue. Returns the task id.
    pub async fn push_retry_task(&self, queue_name: &str, task: &NewRetryTask) -> Result<i64, Error> {
        let queue_name = queue_name.to_string();
        let task = task.clone();
        self.conn
            .call(move |conn| -> Result<i64, Error> {
                let headers_json = serde_json::to_string(&task.headers)?;
                conn.execute(
                    "INSERT INTO retry_tasks (queue_name, method, url, headers_json, body, enqueued_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![queue_name, task.method, task.url, headers_json, task.body, task.enqueued_at],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)
    }

    /// The head of a queue, if any.
    pub async fn oldest_retry_task(&self, queue_name: &str) -> Result<Option<RetryTask>, Error> {
        let queue_name = queue_name.to_string();
        self.conn
            .call(move |conn| -> Result<Option<RetryTask>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, queue_name, method, url, headers_json, body, enqueued_at
                     FROM retry_tasks WHERE queue_name = ?1 ORDER BY id ASC LIMIT 1",
                )?;
                match stmt.query_row(params![queue_name], read_task) {
                    Ok(raw) => Ok(Some(decode_headers(raw)?)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// All tasks of a queue in FIFO order.
    pub async fn list_retry_tasks(&self, queue_name: &str) -> Result<Vec<RetryTask>, Error> {
        let queue_name = queue_name.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<RetryTask>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, queue_name, method, url, headers_json, body, enqueued_at
                     FROM retry_tasks WHERE queue_name = ?1 ORDER BY id ASC",
                )?;
                let rows = stmt.query_map(params![queue_name], read_task)?;
                let mut tasks = Vec::new();
                for raw in rows {
                    tasks.push(decode_headers(raw?)?);
                }
                Ok(tasks)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove a task. Returns whether it existed.
    pub async fn delete_retry_task(&self, id: i64) -> Result<bool, Error> {
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM retry_tasks WHERE id = ?1", params![id])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of tasks waiting in a queue.
    pub async fn count_retry_tasks(&self, queue_name: &str) -> Result<u64, Error> {
        let queue_name = queue_name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM retry_tasks WHERE queue_name = ?1",
                    params![queue_name],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
