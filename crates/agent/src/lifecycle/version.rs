//! One installable version of the agent: its stores, routes and precache.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;
use waystation_core::config::{RouteMatch, StrategyName};
use waystation_core::{AppConfig, CacheDb, Error, RouteConfig};

use crate::expiration::ExpirationPolicy;
use crate::fetch::resolve;
use crate::plugins::Plugin;
use crate::precache::{FallbackDocument, PrecacheManifest, Precacher};
use crate::queue::RetryQueue;
use crate::request::{Request, Response};
use crate::routing::{Matcher, RouteTable};
use crate::storage::CacheNames;
use crate::strategy::{HandlerContext, StrategyHandler, StrategyKind};

pub type VersionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerState {
    Installing,
    Waiting,
    Activating,
    Active,
    Redundant,
}

/// Result of a fetch event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Respond(Response),
    /// Not handled; the host performs the request itself.
    Decline,
}

#[derive(Debug)]
pub struct AgentVersion {
    version: String,
    names: CacheNames,
    routes: RouteTable,
    precacher: Precacher,
    queue: Option<Arc<RetryQueue>>,
    skip_waiting: bool,
    clients_claim: bool,
}

fn parse_method(method: Option<&str>) -> Result<Method, Error> {
    let Some(method) = method else {
        return Ok(Method::GET);
    };
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| Error::InvalidRoute(format!("unknown method {method}")))
}

fn strategy_kind(route: &RouteConfig) -> StrategyKind {
    let timeout = route.network_timeout_seconds.map(Duration::from_secs);
    match route.strategy {
        StrategyName::CacheOnly => StrategyKind::CacheOnly,
        StrategyName::NetworkOnly => StrategyKind::NetworkOnly { timeout },
        StrategyName::CacheFirst => StrategyKind::CacheFirst,
        StrategyName::NetworkFirst => StrategyKind::NetworkFirst { timeout },
        StrategyName::StaleWhileRevalidate => StrategyKind::StaleWhileRevalidate,
    }
}

impl AgentVersion {
    /// Build a version from configuration.
    ///
    /// The precache route comes first, then the app-shell navigation route
    /// when `app_shell_url` is set, then the configured routes in order.
    /// `queue` receives failed mutations from background-sync routes and,
    /// when `queue_failed_mutations` is set, from unmatched requests.
    pub fn from_config(config: &AppConfig, manifest: PrecacheManifest, queue: Arc<RetryQueue>) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;
        let names = CacheNames::from_config(config);
        let manifest = Arc::new(manifest);

        let fallback = match &config.offline_fallback_url {
            Some(url) => Some(FallbackDocument { cache_name: names.fallback(), url: resolve(&origin, url)? }),
            None => None,
        };
        if config.routes.iter().any(|r| r.offline_fallback) {
            config
                .require_offline_fallback()
                .map_err(|e| Error::InvalidRoute(e.to_string()))?;
        }

        let mut routes = RouteTable::new();
        routes.register(
            Matcher::Precache(Arc::clone(&manifest)),
            StrategyHandler::new(StrategyKind::Precached { manifest: Arc::clone(&manifest), bound_url: None }, names.precache()),
        );

        if let Some(shell) = &config.app_shell_url {
            let bound_url = resolve(&origin, shell)?;
            if manifest.lookup(&bound_url).is_none() {
                return Err(Error::Manifest(format!("app shell {bound_url} is not precached")));
            }
            routes.register(
                Matcher::Navigation,
                StrategyHandler::new(
                    StrategyKind::Precached { manifest: Arc::clone(&manifest), bound_url: Some(bound_url) },
                    names.precache(),
                ),
            );
        }

        for route in &config.routes {
            let matcher = match route.matcher {
                RouteMatch::Navigation => Matcher::Navigation,
                RouteMatch::Regex => {
                    let pattern = route
                        .pattern
                        .as_deref()
                        .ok_or_else(|| Error::InvalidRoute("regex route without pattern".into()))?;
                    Matcher::regex(pattern, parse_method(route.method.as_deref())?, &origin)?
                }
            };

            let cache_name = match &route.cache_name {
                Some(name) => names.qualify(name),
                None => names.runtime(),
            };
            let mut handler = StrategyHandler::new(strategy_kind(route), cache_name).with_plugin(
                Plugin::CacheableResponse { statuses: route.statuses.clone().unwrap_or_else(|| vec![200]) },
            );
            if let Some(policy) = ExpirationPolicy::from_route(route) {
                handler = handler.with_plugin(Plugin::Expiration(policy));
            }
            if route.background_sync {
                handler = handler.with_plugin(Plugin::BackgroundSync(Arc::clone(&queue)));
            }
            if route.offline_fallback
                && let Some(document) = &fallback
            {
                handler = handler.with_plugin(Plugin::OfflineFallback(document.clone()));
            }
            routes.register(matcher, handler);
        }

        let precacher = Precacher { cache_name: names.precache(), manifest, fallback };

        Ok(Self {
            version: config.version.clone(),
            names,
            routes,
            precacher,
            queue: config.queue_failed_mutations.then_some(queue),
            skip_waiting: config.skip_waiting,
            clients_claim: config.clients_claim,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn names(&self) -> &CacheNames {
        &self.names
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn precacher(&self) -> &Precacher {
        &self.precacher
    }

    pub fn skip_waiting(&self) -> bool {
        self.skip_waiting
    }

    pub fn clients_claim(&self) -> bool {
        self.clients_claim
    }

    /// Route and resolve one request.
    ///
    /// Strategy failures become a status-0 error response. Unmatched
    /// requests are declined, except mutations when unmatched-mutation
    /// queueing is on.
    pub async fn handle_fetch(&self, ctx: &HandlerContext, request: &Request) -> FetchOutcome {
        let Some(handler) = self.routes.dispatch(request) else {
            return self.unmatched(ctx, request).await;
        };

        let strategy = handler.name();
        match handler.handle(ctx, request).await {
            Ok(response) => FetchOutcome::Respond(response),
            Err(e) => {
                tracing::debug!(url = %request.url, strategy, error = %e, "request failed");
                FetchOutcome::Respond(Response::error())
            }
        }
    }

    async fn unmatched(&self, ctx: &HandlerContext, request: &Request) -> FetchOutcome {
        let Some(queue) = self.queue.as_ref().filter(|_| request.is_mutating()) else {
            return FetchOutcome::Decline;
        };

        match ctx.network.fetch(request).await {
            Ok(response) => FetchOutcome::Respond(response),
            Err(e) if e.is_connectivity() => {
                if let Err(qe) = queue.push_request(request).await {
                    tracing::warn!(url = %request.url, error = %qe, "failed to queue request");
                }
                FetchOutcome::Respond(Response::error())
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "request failed");
                FetchOutcome::Respond(Response::error())
            }
        }
    }

    /// Enforce every expiration policy of this version's routes.
    pub async fn sweep(&self, db: &CacheDb) -> Result<u64, Error> {
        let mut evicted = 0;
        for handler in self.routes.handlers() {
            for plugin in &handler.plugins {
                if let Plugin::Expiration(policy) = plugin {
                    evicted += policy.enforce(db, &handler.cache_name).await?;
                }
            }
        }
        Ok(evicted)
    }
}
