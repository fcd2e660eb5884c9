//! cache_get tool implementation.
//!
//! Looks up the stored response for a request or key, or lists a store.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;
use waystation_agent::fetch::resolve;
use waystation_core::cache::hash::{compute_cache_key, is_valid_key};
use waystation_core::{CacheDb, CacheEntryMeta, Error};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Request URL (absolute or relative to the origin). When omitted, the
    /// entries of `cache` are listed.
    #[serde(default)]
    pub url: Option<String>,

    /// Entry key as reported in listings; takes precedence over `url`.
    #[serde(default)]
    pub key: Option<String>,

    /// Request method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Full store name. All stores are searched when omitted.
    #[serde(default)]
    pub cache: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub entries: Vec<CacheEntryMeta>,
    /// Body of the looked-up entry, decoded as UTF-8 (lossy).
    pub body: Option<String>,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(cache: &CacheDb, origin: &Url, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let key = match (&params.key, &params.url) {
        (Some(key), _) if !is_valid_key(key) => {
            return Err(Error::InvalidInput(format!("not a cache key: {key}")).into());
        }
        (Some(key), _) => Some(key.clone()),
        (None, Some(url)) => {
            let mut url = resolve(origin, url).map_err(Error::from)?;
            url.set_fragment(None);
            Some(compute_cache_key(&params.method, url.as_str(), ""))
        }
        (None, None) => None,
    };

    let output = match (key, &params.cache) {
        (None, None) => {
            return Err(Error::InvalidInput("At least one of url, key or cache must be specified".to_string()).into());
        }
        (None, Some(store)) => CacheGetOutput { entries: cache.list_entries(store).await?, body: None },
        (Some(key), store) => {
            let entry = match store {
                Some(store) => cache.get_entry(store, &key).await?,
                None => cache.find_entry(&key).await?,
            }
            .ok_or_else(|| Error::CacheMiss(key.clone()))?;

            CacheGetOutput { entries: vec![entry.meta()], body: Some(String::from_utf8_lossy(&entry.body).into_owned()) }
        }
    };

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize entry: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::text;
    use std::collections::BTreeMap;
    use waystation_core::CacheEntry;

    fn origin() -> Url {
        Url::parse("https://app.test").unwrap()
    }

    fn entry(cache_name: &str, url: &str, body: &str) -> CacheEntry {
        CacheEntry {
            cache_name: cache_name.to_string(),
            key: compute_cache_key("GET", url, ""),
            method: "GET".to_string(),
            url: url.to_string(),
            status: 200,
            headers: BTreeMap::new(),
            body: body.as_bytes().to_vec(),
            stored_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_get_impl_missing() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let params = CacheGetParams { url: Some("/nonexistent".into()), key: None, method: "GET".into(), cache: None };

        let result = get_impl(&cache, &origin(), params).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_get_impl_found() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        cache.put_entry(&entry("images", "https://app.test/logo.png", "png")).await.unwrap();

        let params = CacheGetParams { url: Some("/logo.png#top".into()), key: None, method: "GET".into(), cache: None };
        let result = get_impl(&cache, &origin(), params).await.unwrap();
        let output: CacheGetOutput = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(output.body.as_deref(), Some("png"));
        assert_eq!(output.entries[0].cache_name, "images");
    }

    #[tokio::test]
    async fn test_get_impl_lists_store() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        cache.put_entry(&entry("images", "https://app.test/a.png", "a")).await.unwrap();
        cache.put_entry(&entry("images", "https://app.test/b.png", "b")).await.unwrap();

        let params = CacheGetParams { url: None, key: None, method: "GET".into(), cache: Some("images".into()) };
        let result = get_impl(&cache, &origin(), params).await.unwrap();
        let output: CacheGetOutput = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(output.entries.len(), 2);
        assert!(output.body.is_none());

        let key = output.entries[1].key.clone();
        let params = CacheGetParams { url: None, key: Some(key), method: "GET".into(), cache: Some("images".into()) };
        let result = get_impl(&cache, &origin(), params).await.unwrap();
        let output: CacheGetOutput = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(output.body.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_get_impl_rejects_malformed_key() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let params = CacheGetParams { url: None, key: Some("abc".into()), method: "GET".into(), cache: None };
        assert!(get_impl(&cache, &origin(), params).await.is_err());
    }

    #[tokio::test]
    async fn test_get_impl_no_params() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let params = CacheGetParams { url: None, key: None, method: "GET".into(), cache: None };
        assert!(get_impl(&cache, &origin(), params).await.is_err());
    }
}
