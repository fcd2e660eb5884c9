//! SQLite-backed storage for cache stores and the retry queue.
//!
//! This module provides a persistent cache using SQLite with async access via
//! tokio-rusqlite. It supports:
//!
//! - Named, versioned stores (`{prefix}-{name}-{suffix}`) created on first write
//! - Content-addressed entry keys using SHA-256 request fingerprints
//! - Oldest-first trimming and age-based purging for expiration policies
//! - A durable FIFO table of retry tasks
//! - Automatic schema migrations and WAL mode

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod queue;
pub mod stores;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheEntry, CacheEntryMeta};
pub use queue::{NewRetryTask, RetryTask};

/// Timestamp format used for every stored time column.
///
/// Fixed-width UTC with millisecond precision so that lexical comparison in
/// SQL matches chronological order.
pub fn format_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Parse a timestamp written by [`format_timestamp`].
pub fn parse_timestamp(value: &str) -> Result<chrono::DateTime<chrono::Utc>, Error> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&chrono::Utc))
        .map_err(|e| Error::Serialization(format!("bad timestamp {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_timestamp_round_trip_is_lexically_ordered() {
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 11, 2, 3, 4, 5).unwrap();
        let (a, b) = (format_timestamp(&early), format_timestamp(&late));
        assert!(a < b);
        assert_eq!(parse_timestamp(&a).unwrap(), early);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(matches!(parse_timestamp("yesterday"), Err(Error::Serialization(_))));
    }
}
