//! Strategy engine.
//!
//! ### Strategies
//! - CacheOnly: store or `CacheMiss`
//! - NetworkOnly: network, optionally bounded by a timeout
//! - CacheFirst: fresh store entry, else network with write-through
//! - NetworkFirst: network with write-through, else any store entry
//! - StaleWhileRevalidate: store entry now, refresh in the background
//! - Precached: revisioned precache entry, else network
//!
//! ### Writes
//! - Only GET responses accepted by every `cache_will_update` hook are
//!   written; each write runs the `cache_did_update` hooks.
//! - Stale entries (rejected by `cached_response_will_be_used`) are kept as
//!   a last resort for when the network is unavailable.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Method;
use url::Url;
use waystation_core::{CacheDb, Error};

use crate::fetch::Network;
use crate::keepalive::KeepAlive;
use crate::plugins::Plugin;
use crate::precache::PrecacheManifest;
use crate::request::{Request, Response};

#[derive(Debug, Clone)]
pub enum StrategyKind {
    CacheOnly,
    NetworkOnly { timeout: Option<Duration> },
    CacheFirst,
    NetworkFirst { timeout: Option<Duration> },
    StaleWhileRevalidate,
    /// Serve from the precache; `bound_url` answers every matched request
    /// with one document (app shell).
    Precached { manifest: Arc<PrecacheManifest>, bound_url: Option<Url> },
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::CacheOnly => "cache-only",
            StrategyKind::NetworkOnly { .. } => "network-only",
            StrategyKind::CacheFirst => "cache-first",
            StrategyKind::NetworkFirst { .. } => "network-first",
            StrategyKind::StaleWhileRevalidate => "stale-while-revalidate",
            StrategyKind::Precached { .. } => "precache",
        }
    }
}

/// What a strategy needs from the running agent.
#[derive(Clone)]
pub struct HandlerContext {
    pub db: CacheDb,
    pub network: Arc<dyn Network>,
    pub keep_alive: KeepAlive,
}

enum Lookup {
    Fresh(Response),
    Stale(Response),
    Miss,
}

/// A strategy bound to its store and plugins.
#[derive(Debug)]
pub struct StrategyHandler {
    pub kind: StrategyKind,
    pub cache_name: String,
    pub plugins: Vec<Plugin>,
}

impl StrategyHandler {
    pub fn new(kind: StrategyKind, cache_name: impl Into<String>) -> Self {
        Self { kind, cache_name: cache_name.into(), plugins: Vec::new() }
    }

    pub fn with_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Resolve `request`.
    ///
    /// When the strategy fails, `handler_did_error` hooks may still supply a
    /// response; otherwise the strategy's error is returned.
    pub async fn handle(self: Arc<Self>, ctx: &HandlerContext, request: &Request) -> Result<Response, Error> {
        let result = match &self.kind {
            StrategyKind::CacheOnly => self.cache_only(ctx, request).await,
            StrategyKind::NetworkOnly { timeout } => self.fetch(ctx, request, *timeout).await,
            StrategyKind::CacheFirst => self.cache_first(ctx, request).await,
            StrategyKind::NetworkFirst { timeout } => self.network_first(ctx, request, *timeout).await,
            StrategyKind::StaleWhileRevalidate => Arc::clone(&self).stale_while_revalidate(ctx, request).await,
            StrategyKind::Precached { manifest, bound_url } => {
                self.precached(ctx, request, manifest, bound_url.as_ref()).await
            }
        };

        let err = match result {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        for plugin in &self.plugins {
            match plugin.handler_did_error(ctx, request).await {
                Ok(Some(response)) => {
                    tracing::debug!(url = %request.url, error = %err, "served offline fallback");
                    return Ok(response);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(url = %request.url, error = %e, "fallback lookup failed"),
            }
        }
        Err(err)
    }

    async fn cache_only(&self, ctx: &HandlerContext, request: &Request) -> Result<Response, Error> {
        match self.lookup(ctx, request).await {
            Lookup::Fresh(response) => Ok(response),
            Lookup::Stale(_) | Lookup::Miss => Err(Error::CacheMiss(request.url.to_string())),
        }
    }

    async fn cache_first(&self, ctx: &HandlerContext, request: &Request) -> Result<Response, Error> {
        let stale = match self.lookup(ctx, request).await {
            Lookup::Fresh(response) => return Ok(response),
            Lookup::Stale(response) => Some(response),
            Lookup::Miss => None,
        };

        match self.fetch(ctx, request, None).await {
            Ok(response) => {
                self.put(ctx, request, &response).await;
                Ok(response)
            }
            Err(e) => stale.ok_or(e),
        }
    }

    async fn network_first(
        &self, ctx: &HandlerContext, request: &Request, timeout: Option<Duration>,
    ) -> Result<Response, Error> {
        match self.fetch(ctx, request, timeout).await {
            Ok(response) => {
                self.put(ctx, request, &response).await;
                Ok(response)
            }
            Err(e) => match self.lookup(ctx, request).await {
                Lookup::Fresh(response) | Lookup::Stale(response) => {
                    tracing::debug!(url = %request.url, error = %e, "network failed, served from cache");
                    Ok(response)
                }
                Lookup::Miss => Err(Error::NoFallbackAvailable(format!("{}: {e}", request.url))),
            },
        }
    }

    async fn stale_while_revalidate(self: Arc<Self>, ctx: &HandlerContext, request: &Request) -> Result<Response, Error> {
        match self.lookup(ctx, request).await {
            Lookup::Fresh(response) => {
                self.revalidate(ctx, request);
                Ok(response)
            }
            Lookup::Stale(response) => match self.fetch_and_put(ctx, request).await {
                Ok(fresh) => Ok(fresh),
                Err(e) => {
                    tracing::debug!(url = %request.url, error = %e, "refresh failed, served stale entry");
                    Ok(response)
                }
            },
            Lookup::Miss => self.fetch_and_put(ctx, request).await,
        }
    }

    async fn precached(
        &self, ctx: &HandlerContext, request: &Request, manifest: &PrecacheManifest, bound_url: Option<&Url>,
    ) -> Result<Response, Error> {
        let target = bound_url.unwrap_or(&request.url);
        let Some(entry) = manifest.lookup(target) else {
            return Err(Error::CacheMiss(target.to_string()));
        };

        if let Some(stored) = ctx.db.get_entry(&self.cache_name, &entry.key).await? {
            tracing::debug!(url = %entry.url, "precache hit");
            return Ok(Response::from_entry(stored));
        }

        tracing::debug!(url = %entry.url, "precache entry missing, fetching");
        self.fetch(ctx, &Request::get(entry.url.clone()), None).await
    }

    /// Refresh the store in the background.
    fn revalidate(self: Arc<Self>, ctx: &HandlerContext, request: &Request) {
        let handler = self;
        let task_ctx = ctx.clone();
        let request = request.clone();
        ctx.keep_alive.wait_until("revalidate", async move {
            handler.fetch_and_put(&task_ctx, &request).await.map(|_| ())
        });
    }

    async fn fetch_and_put(&self, ctx: &HandlerContext, request: &Request) -> Result<Response, Error> {
        let response = self.fetch(ctx, request, None).await?;
        self.put(ctx, request, &response).await;
        Ok(response)
    }

    /// Network fetch; connectivity failures run the `fetch_did_fail` hooks.
    async fn fetch(&self, ctx: &HandlerContext, request: &Request, timeout: Option<Duration>) -> Result<Response, Error> {
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, ctx.network.fetch(request)).await {
                Ok(result) => result,
                Err(_) => Err(Error::NetworkTimeout(format!("{} after {}s", request.url, limit.as_secs_f64()))),
            },
            None => ctx.network.fetch(request).await,
        };

        if let Err(e) = &result
            && e.is_connectivity()
        {
            for plugin in &self.plugins {
                if let Err(hook_err) = plugin.fetch_did_fail(request).await {
                    tracing::warn!(url = %request.url, error = %hook_err, "fetch_did_fail hook failed");
                }
            }
        }
        result
    }

    async fn lookup(&self, ctx: &HandlerContext, request: &Request) -> Lookup {
        if request.method != Method::GET {
            return Lookup::Miss;
        }

        let entry = match ctx.db.get_entry(&self.cache_name, &request.fingerprint()).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!(cache = %self.cache_name, url = %request.url, "cache miss");
                return Lookup::Miss;
            }
            Err(e) => {
                tracing::warn!(cache = %self.cache_name, error = %e, "cache read failed");
                return Lookup::Miss;
            }
        };

        let now = Utc::now();
        let fresh = self.plugins.iter().all(|p| p.cached_response_will_be_used(&entry, now));
        tracing::debug!(cache = %self.cache_name, url = %request.url, fresh, "cache hit");

        let response = Response::from_entry(entry);
        if fresh { Lookup::Fresh(response) } else { Lookup::Stale(response) }
    }

    fn is_cacheable(&self, response: &Response) -> bool {
        let mut filtered = false;
        for plugin in &self.plugins {
            if let Plugin::CacheableResponse { .. } = plugin {
                filtered = true;
            }
            if !plugin.cache_will_update(response) {
                return false;
            }
        }
        filtered || response.status == 200
    }

    /// Write-through. Failures are logged, never returned to the caller.
    async fn put(&self, ctx: &HandlerContext, request: &Request, response: &Response) {
        if request.method != Method::GET || !self.is_cacheable(response) {
            return;
        }

        if let Err(e) = ctx.db.put_entry(&response.to_entry(&self.cache_name, request)).await {
            tracing::warn!(cache = %self.cache_name, url = %request.url, error = %e, "cache write failed");
            return;
        }
        for plugin in &self.plugins {
            plugin.cache_did_update(ctx, &self.cache_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expiration::ExpirationPolicy;
    use crate::precache::{FallbackDocument, ManifestEntry};
    use crate::queue::RetryQueue;
    use crate::request::ResponseSource;
    use crate::testing::{context, url};

    const APP: &str = "https://app.test/data.json";

    fn handler(kind: StrategyKind) -> Arc<StrategyHandler> {
        Arc::new(StrategyHandler::new(kind, "runtime"))
    }

    async fn seed(ctx: &HandlerContext, cache: &str, target: &str, body: &str) {
        let request = Request::get(url(target));
        ctx.db.put_entry(&Response::new(200, body.to_string()).to_entry(cache, &request)).await.unwrap();
    }

    async fn stored_body(ctx: &HandlerContext, target: &str) -> Option<Vec<u8>> {
        let key = Request::get(url(target)).fingerprint();
        ctx.db.get_entry("runtime", &key).await.unwrap().map(|e| e.body)
    }

    #[tokio::test]
    async fn test_cache_only_miss() {
        let (ctx, network) = context().await;
        let result = handler(StrategyKind::CacheOnly).handle(&ctx, &Request::get(url(APP))).await;
        assert!(matches!(result, Err(Error::CacheMiss(_))));
        assert!(network.calls().is_empty());

        seed(&ctx, "runtime", APP, "cached").await;
        let hit = handler(StrategyKind::CacheOnly).handle(&ctx, &Request::get(url(APP))).await.unwrap();
        assert_eq!(hit.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_network_only_never_writes() {
        let (ctx, network) = context().await;
        network.respond(APP, 200, "net");
        let response = handler(StrategyKind::NetworkOnly { timeout: None })
            .handle(&ctx, &Request::get(url(APP)))
            .await
            .unwrap();
        assert_eq!(response.body, "net");
        assert!(stored_body(&ctx, APP).await.is_none());
    }

    #[tokio::test]
    async fn test_cache_first_hit_skips_network() {
        let (ctx, network) = context().await;
        seed(&ctx, "runtime", APP, "cached").await;
        network.respond(APP, 200, "net");

        let response = handler(StrategyKind::CacheFirst).handle(&ctx, &Request::get(url(APP))).await.unwrap();
        assert_eq!(response.body, "cached");
        assert_eq!(network.calls_to(APP), 0);
    }

    #[tokio::test]
    async fn test_cache_first_miss_writes_through() {
        let (ctx, network) = context().await;
        network.respond(APP, 200, "net");

        let response = handler(StrategyKind::CacheFirst).handle(&ctx, &Request::get(url(APP))).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(stored_body(&ctx, APP).await.unwrap(), b"net");
    }

    #[tokio::test]
    async fn test_error_statuses_are_not_written() {
        let (ctx, network) = context().await;
        network.respond(APP, 500, "boom");

        let response = handler(StrategyKind::CacheFirst).handle(&ctx, &Request::get(url(APP))).await.unwrap();
        assert_eq!(response.status, 500);
        assert!(stored_body(&ctx, APP).await.is_none());
    }

    #[tokio::test]
    async fn test_cache_first_prefers_network_over_expired_entry() {
        let (ctx, network) = context().await;
        let old = Request::get(url(APP));
        let mut entry = Response::new(200, "old").to_entry("runtime", &old);
        entry.stored_at = "2020-01-01T00:00:00.000Z".into();
        ctx.db.put_entry(&entry).await.unwrap();
        network.respond(APP, 200, "new");

        let expiring = Arc::new(StrategyHandler::new(StrategyKind::CacheFirst, "runtime").with_plugin(
            Plugin::Expiration(ExpirationPolicy { max_entries: None, max_age: Some(Duration::from_secs(60)) }),
        ));
        let response = Arc::clone(&expiring).handle(&ctx, &old).await.unwrap();
        assert_eq!(response.body, "new");
        ctx.keep_alive.settled().await;

        let mut entry = Response::new(200, "old").to_entry("runtime", &old);
        entry.stored_at = "2020-01-01T00:00:00.000Z".into();
        ctx.db.put_entry(&entry).await.unwrap();
        network.set_offline(true);
        let response = expiring.handle(&ctx, &old).await.unwrap();
        assert_eq!(response.body, "old");
        ctx.keep_alive.settled().await;
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_cache() {
        let (ctx, network) = context().await;
        seed(&ctx, "runtime", APP, "cached").await;
        network.set_offline(true);

        let response = handler(StrategyKind::NetworkFirst { timeout: None })
            .handle(&ctx, &Request::get(url(APP)))
            .await
            .unwrap();
        assert_eq!(response.body, "cached");
    }

    #[tokio::test]
    async fn test_network_first_timeout_uses_cache() {
        let (ctx, network) = context().await;
        seed(&ctx, "runtime", APP, "cached").await;
        network.respond(APP, 200, "slow");
        network.delay(APP, Duration::from_millis(500));

        let response = handler(StrategyKind::NetworkFirst { timeout: Some(Duration::from_millis(20)) })
            .handle(&ctx, &Request::get(url(APP)))
            .await
            .unwrap();
        assert_eq!(response.body, "cached");
    }

    #[tokio::test]
    async fn test_network_first_without_fallback() {
        let (ctx, network) = context().await;
        network.set_offline(true);

        let result = handler(StrategyKind::NetworkFirst { timeout: None })
            .handle(&ctx, &Request::get(url(APP)))
            .await;
        assert!(matches!(result, Err(Error::NoFallbackAvailable(_))));
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_refreshes_in_background() {
        let (ctx, network) = context().await;
        seed(&ctx, "runtime", APP, "v1").await;
        network.respond(APP, 200, "v2");
        network.delay(APP, Duration::from_millis(50));

        let response = handler(StrategyKind::StaleWhileRevalidate)
            .handle(&ctx, &Request::get(url(APP)))
            .await
            .unwrap();
        assert_eq!(response.body, "v1");
        assert_eq!(response.source, ResponseSource::Cache);

        ctx.keep_alive.settled().await;
        assert_eq!(stored_body(&ctx, APP).await.unwrap(), b"v2");
        assert_eq!(network.calls_to(APP), 1);
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_miss_awaits_network_once() {
        let (ctx, network) = context().await;
        network.respond(APP, 200, "v1");

        let response = handler(StrategyKind::StaleWhileRevalidate)
            .handle(&ctx, &Request::get(url(APP)))
            .await
            .unwrap();
        assert_eq!(response.body, "v1");
        ctx.keep_alive.settled().await;
        assert_eq!(network.calls_to(APP), 1);
        assert_eq!(stored_body(&ctx, APP).await.unwrap(), b"v1");
    }

    #[tokio::test]
    async fn test_failed_post_enqueued_once() {
        let (ctx, network) = context().await;
        let queue = Arc::new(RetryQueue::new(ctx.db.clone(), "q", Duration::from_secs(60)));
        let handler = Arc::new(
            StrategyHandler::new(StrategyKind::NetworkOnly { timeout: None }, "auth")
                .with_plugin(Plugin::BackgroundSync(queue.clone())),
        );
        let login = Request::post(url("https://app.test/auth/login"), "{}");

        network.set_offline(true);
        assert!(Arc::clone(&handler).handle(&ctx, &login).await.is_err());
        assert_eq!(queue.len().await.unwrap(), 1);

        network.set_offline(false);
        network.respond("https://app.test/auth/login", 500, "boom");
        let response = handler.handle(&ctx, &login).await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_navigation_served_offline_document() {
        let (ctx, network) = context().await;
        seed(&ctx, "fallback", "https://app.test/offline.html", "offline").await;
        network.set_offline(true);

        let handler = Arc::new(StrategyHandler::new(StrategyKind::NetworkFirst { timeout: None }, "pages").with_plugin(
            Plugin::OfflineFallback(FallbackDocument {
                cache_name: "fallback".into(),
                url: url("https://app.test/offline.html"),
            }),
        ));
        let response = handler.handle(&ctx, &Request::navigate(url("https://app.test/todos"))).await.unwrap();
        assert_eq!(response.source, ResponseSource::Fallback);
        assert_eq!(response.body, "offline");
    }

    #[tokio::test]
    async fn test_precached_bound_app_shell() {
        let (ctx, network) = context().await;
        let manifest = Arc::new(
            PrecacheManifest::new(
                &[ManifestEntry { url: "/index.html".into(), revision: Some("r1".into()) }],
                &url("https://app.test"),
                &[],
            )
            .unwrap(),
        );
        let entry = &manifest.entries()[0];
        ctx.db
            .put_entry(&waystation_core::CacheEntry {
                cache_name: "pre".into(),
                key: entry.key.clone(),
                method: "GET".into(),
                url: entry.cache_key_url.to_string(),
                status: 200,
                headers: Default::default(),
                body: b"shell".to_vec(),
                stored_at: "2026-01-01T00:00:00.000Z".into(),
            })
            .await
            .unwrap();

        let shell = Arc::new(StrategyHandler::new(
            StrategyKind::Precached { manifest, bound_url: Some(url("https://app.test/index.html")) },
            "pre",
        ));
        let response = shell.handle(&ctx, &Request::navigate(url("https://app.test/todos/4"))).await.unwrap();
        assert_eq!(response.body, "shell");
        assert!(network.calls().is_empty());
    }
}
