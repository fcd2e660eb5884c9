//! cache_purge tool implementation.
//!
//! Deletes a whole store, or entries by URL, age or count.

use chrono::{Duration, Utc};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use waystation_core::{CacheDb, Error};

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Full store name. Alone, deletes the store and all of its entries.
    #[serde(default)]
    pub cache: Option<String>,

    /// Purge entries in any store whose URL contains this text.
    #[serde(default)]
    pub url_contains: Option<String>,

    /// Purge entries of `cache` older than this many days.
    #[serde(default)]
    pub older_than_days: Option<i64>,

    /// Keep only the newest N entries of `cache`.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted.
    pub deleted: u64,
    /// Whether a whole store was removed.
    pub store_deleted: bool,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(cache: &CacheDb, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    if params.cache.is_none() && params.url_contains.is_none() {
        return Err(Error::InvalidInput("At least one of cache or url_contains must be specified".to_string()).into());
    }
    if params.cache.is_none() && (params.older_than_days.is_some() || params.max_entries.is_some()) {
        return Err(Error::InvalidInput("older_than_days and max_entries require cache".to_string()).into());
    }

    let mut output = CachePurgeOutput { deleted: 0, store_deleted: false };

    if let Some(pattern) = &params.url_contains {
        output.deleted += cache.purge_entries_by_url(pattern).await?;
    }

    if let Some(store) = &params.cache {
        if let Some(days) = params.older_than_days {
            let age = Duration::try_days(days)
                .filter(|age| *age >= Duration::zero())
                .ok_or_else(|| Error::InvalidInput(format!("older_than_days out of range: {days}")))?;
            output.deleted += cache.purge_entries_older_than(store, Utc::now() - age).await?;
        }
        if let Some(max_entries) = params.max_entries {
            output.deleted += cache.trim_entries(store, max_entries).await?;
        }
        if params.older_than_days.is_none() && params.max_entries.is_none() && params.url_contains.is_none() {
            output.deleted += cache.count_entries(store).await?;
            output.store_deleted = cache.delete_cache(store).await?;
        }
    }

    tracing::info!(deleted = output.deleted, store_deleted = output.store_deleted, "cache purged");
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::text;
    use std::collections::BTreeMap;
    use waystation_core::CacheEntry;
    use waystation_core::cache::hash::compute_cache_key;

    fn make_test_entry(cache_name: &str, url: &str) -> CacheEntry {
        CacheEntry {
            cache_name: cache_name.to_string(),
            key: compute_cache_key("GET", url, ""),
            method: "GET".to_string(),
            url: url.to_string(),
            status: 200,
            headers: BTreeMap::new(),
            body: b"body".to_vec(),
            stored_at: waystation_core::cache::format_timestamp(&Utc::now()),
        }
    }

    async fn purge(cache: &CacheDb, params: CachePurgeParams) -> CachePurgeOutput {
        let result = purge_impl(cache, params).await.unwrap();
        serde_json::from_str(&text(&result)).unwrap()
    }

    #[tokio::test]
    async fn test_purge_by_url() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        cache.put_entry(&make_test_entry("api", "https://dummyjson.com/todos")).await.unwrap();
        cache.put_entry(&make_test_entry("images", "https://app.test/logo.png")).await.unwrap();

        let output = purge(&cache, CachePurgeParams { url_contains: Some("dummyjson".into()), ..Default::default() }).await;
        assert_eq!(output.deleted, 1);
        assert!(!output.store_deleted);
    }

    #[tokio::test]
    async fn test_purge_trims_store() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        cache.put_entry(&make_test_entry("images", "https://app.test/1.png")).await.unwrap();
        cache.put_entry(&make_test_entry("images", "https://app.test/2.png")).await.unwrap();

        let output = purge(
            &cache,
            CachePurgeParams { cache: Some("images".into()), max_entries: Some(1), ..Default::default() },
        )
        .await;
        assert_eq!(output.deleted, 1);
        assert_eq!(cache.count_entries("images").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_whole_store() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        cache.put_entry(&make_test_entry("images", "https://app.test/1.png")).await.unwrap();

        let output = purge(&cache, CachePurgeParams { cache: Some("images".into()), ..Default::default() }).await;
        assert_eq!(output.deleted, 1);
        assert!(output.store_deleted);
        assert!(!cache.has_cache("images").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_no_params() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        assert!(purge_impl(&cache, CachePurgeParams::default()).await.is_err());
        let orphan = CachePurgeParams { max_entries: Some(1), url_contains: Some("x".into()), ..Default::default() };
        assert!(purge_impl(&cache, orphan).await.is_err());
    }
}
