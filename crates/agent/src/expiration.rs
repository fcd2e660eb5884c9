//! Per-store expiration limits.
//!
//! Enforcement runs after writes and on the periodic sweep; it is cleanup,
//! not correctness. Strategies use [`ExpirationPolicy::is_fresh`] to avoid
//! preferring an entry that outlived `max_age`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use waystation_core::cache::parse_timestamp;
use waystation_core::{CacheDb, Error, RouteConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirationPolicy {
    pub max_entries: Option<usize>,
    pub max_age: Option<Duration>,
}

impl ExpirationPolicy {
    /// The policy declared by a route, if it has any limit.
    pub fn from_route(route: &RouteConfig) -> Option<Self> {
        route.is_bounded().then(|| Self {
            max_entries: route.max_entries,
            max_age: route.max_age_seconds.map(Duration::from_secs),
        })
    }

    /// Whether an entry written at `stored_at` may still be served first.
    ///
    /// Unparseable timestamps count as expired.
    pub fn is_fresh(&self, stored_at: &str, now: DateTime<Utc>) -> bool {
        let Some(max_age) = self.max_age else {
            return true;
        };
        let Ok(stored_at) = parse_timestamp(stored_at) else {
            return false;
        };
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => stored_at + max_age > now,
            Err(_) => true,
        }
    }

    /// Delete expired entries, then the oldest-inserted entries beyond
    /// `max_entries`. Returns the number of evicted entries.
    pub async fn enforce(&self, db: &CacheDb, cache_name: &str) -> Result<u64, Error> {
        let mut evicted = 0;

        if let Some(max_age) = self.max_age
            && let Ok(max_age) = chrono::Duration::from_std(max_age)
        {
            evicted += db.purge_entries_older_than(cache_name, Utc::now() - max_age).await?;
        }

        if let Some(max_entries) = self.max_entries {
            evicted += db.trim_entries(cache_name, max_entries).await?;
        }

        if evicted > 0 {
            tracing::debug!(cache = cache_name, evicted, "expiration enforced");
        }
        Ok(evicted)
    }
}
