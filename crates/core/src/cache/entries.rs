//! Cache entry CRUD and eviction queries.
//!
//! Entries belong to exactly one named store. Writes register the store on
//! first use and stamp each entry with a per-store insertion sequence that the
//! expiration policy uses for oldest-first trimming.

use std::collections::{BTreeMap, HashSet};

use super::connection::CacheDb;
use super::format_timestamp;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored response keyed by request fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cache_name: String,
    pub key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    /// RFC 3339 timestamp of the write, see [`super::format_timestamp`].
    pub stored_at: String,
}

/// Entry summary without the body, for listings.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheEntryMeta {
    pub cache_name: String,
    pub key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub stored_at: String,
    pub body_len: usize,
}

impl CacheEntry {
    pub fn meta(&self) -> CacheEntryMeta {
        CacheEntryMeta {
            cache_name: self.cache_name.clone(),
            key: self.key.clone(),
            method: self.method.clone(),
            url: self.url.clone(),
            status: self.status,
            stored_at: self.stored_at.clone(),
            body_len: self.body.len(),
        }
    }
}

const SELECT_ENTRY: &str = "SELECT cache_name, key, method, url, status, headers_json, body, stored_at
     FROM cache_entries";

fn insert_entry(conn: &rusqlite::Connection, entry: &CacheEntry) -> Result<(), Error> {
    let headers_json = serde_json::to_string(&entry.headers)?;
    conn.execute(
        "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
        params![&entry.cache_name, format_timestamp(&Utc::now())],
    )?;
    conn.execute(
        "INSERT INTO cache_entries (cache_name, key, method, url, status, headers_json, body, stored_at, seq)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                 (SELECT COALESCE(MAX(seq), 0) + 1 FROM cache_entries WHERE cache_name = ?1))
         ON CONFLICT(cache_name, key) DO UPDATE SET
             method = excluded.method,
             url = excluded.url,
             status = excluded.status,
             headers_json = excluded.headers_json,
             body = excluded.body,
             stored_at = excluded.stored_at,
             seq = excluded.seq",
        params![
            &entry.cache_name,
            &entry.key,
            &entry.method,
            &entry.url,
            entry.status,
            headers_json,
            &entry.body,
            &entry.stored_at,
        ],
    )?;
    Ok(())
}

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<(CacheEntry, String)> {
    Ok((
        CacheEntry {
            cache_name: row.get(0)?,
            key: row.get(1)?,
            method: row.get(2)?,
            url: row.get(3)?,
            status: row.get(4)?,
            headers: BTreeMap::new(),
            body: row.get(6)?,
            stored_at: row.get(7)?,
        },
        row.get(5)?,
    ))
}

fn decode_headers((mut entry, headers_json): (CacheEntry, String)) -> Result<CacheEntry, Error> {
    entry.headers = serde_json::from_str(&headers_json)?;
    Ok(entry)
}

impl CacheDb {
    /// Insert or update an entry, creating its store on first write.
    ///
    /// Uses UPSERT semantics: a rewrite of an existing key keeps the entry
    /// count unchanged but moves the entry to the newest insertion slot.
    pub async fn put_entry(&self, entry: &CacheEntry) -> Result<(), Error> {
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                insert_entry(&tx, &entry)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Write a batch of entries in a single transaction.
    ///
    /// Either every entry lands or none does.
    pub async fn put_entries(&self, entries: Vec<CacheEntry>) -> Result<(), Error> {
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                for entry in &entries {
                    insert_entry(&tx, entry)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry by store name and key.
    ///
    /// Returns None if the key doesn't exist in the store.
    pub async fn get_entry(&self, cache_name: &str, key: &str) -> Result<Option<CacheEntry>, Error> {
        let cache_name = cache_name.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(&format!("{SELECT_ENTRY} WHERE cache_name = ?1 AND key = ?2"))?;
                match stmt.query_row(params![cache_name, key], read_entry) {
                    Ok(raw) => Ok(Some(decode_headers(raw)?)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Find the first entry for a key across all stores, oldest store first.
    pub async fn find_entry(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_ENTRY} WHERE key = ?1
                     ORDER BY (SELECT created_at FROM caches WHERE name = cache_name) ASC LIMIT 1"
                ))?;
                match stmt.query_row(params![key], read_entry) {
                    Ok(raw) => Ok(Some(decode_headers(raw)?)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a single entry. Returns whether it existed.
    pub async fn delete_entry(&self, cache_name: &str, key: &str) -> Result<bool, Error> {
        let cache_name = cache_name.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_entries WHERE cache_name = ?1 AND key = ?2",
                    params![cache_name, key],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a store.
    pub async fn count_entries(&self, cache_name: &str) -> Result<u64, Error> {
        let cache_name = cache_name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE cache_name = ?1",
                    params![cache_name],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Entry summaries of a store, oldest insertion first.
    pub async fn list_entries(&self, cache_name: &str) -> Result<Vec<CacheEntryMeta>, Error> {
        let cache_name = cache_name.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<CacheEntryMeta>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT cache_name, key, method, url, status, stored_at, LENGTH(body)
                     FROM cache_entries WHERE cache_name = ?1 ORDER BY seq ASC",
                )?;
                let rows = stmt.query_map(params![cache_name], |row| {
                    Ok(CacheEntryMeta {
                        cache_name: row.get(0)?,
                        key: row.get(1)?,
                        method: row.get(2)?,
                        url: row.get(3)?,
                        status: row.get(4)?,
                        stored_at: row.get(5)?,
                        body_len: row.get::<_, i64>(6)? as usize,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry of a store whose key is not in `keep`.
    ///
    /// Returns the number of deleted entries.
    pub async fn retain_entries(&self, cache_name: &str, keep: Vec<String>) -> Result<u64, Error> {
        let cache_name = cache_name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let keep: HashSet<String> = keep.into_iter().collect();
                let tx = conn.transaction()?;
                let stale: Vec<String> = {
                    let mut stmt = tx.prepare("SELECT key FROM cache_entries WHERE cache_name = ?1")?;
                    let keys = stmt.query_map(params![&cache_name], |row| row.get::<_, String>(0))?;
                    let keys = keys.collect::<Result<Vec<_>, _>>()?;
                    keys.into_iter().filter(|k| !keep.contains(k)).collect()
                };
                for key in &stale {
                    tx.execute(
                        "DELETE FROM cache_entries WHERE cache_name = ?1 AND key = ?2",
                        params![&cache_name, key],
                    )?;
                }
                tx.commit()?;
                Ok(stale.len() as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries of a store written before `cutoff`.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_entries_older_than(&self, cache_name: &str, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        let cache_name = cache_name.to_string();
        let cutoff = format_timestamp(&cutoff);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_entries WHERE cache_name = ?1 AND stored_at < ?2",
                    params![cache_name, cutoff],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Purge oldest-inserted entries until count <= max_entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn trim_entries(&self, cache_name: &str, max_entries: usize) -> Result<u64, Error> {
        let cache_name = cache_name.to_string();
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE cache_name = ?1",
                    params![&cache_name],
                    |row| row.get(0),
                )?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM cache_entries WHERE cache_name = ?1 AND key IN (
                        SELECT key FROM cache_entries WHERE cache_name = ?1 ORDER BY seq ASC LIMIT ?2
                    )",
                    params![&cache_name, to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries in any store whose URL contains `pattern`.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_entries_by_url(&self, pattern: &str) -> Result<u64, Error> {
        let pattern = format!("%{pattern}%");
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM cache_entries WHERE url LIKE ?1", params![pattern])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
