//! Ordered route table.
//!
//! Routes are tried in registration order and the first matcher that
//! accepts the request picks the handler. Unmatched requests are not the
//! table's concern; the caller lets them through to the network.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use reqwest::Method;
use url::{Origin, Url};
use waystation_core::Error;

use crate::precache::PrecacheManifest;
use crate::request::Request;
use crate::strategy::StrategyHandler;

type Predicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// A pure predicate over a request.
#[derive(Clone)]
pub enum Matcher {
    /// GET requests in navigate mode.
    Navigation,
    /// `regex` over the full URL, restricted to `method`.
    ///
    /// Same-origin URLs may match anywhere; cross-origin URLs only when the
    /// match starts at the first character.
    Regex { regex: Regex, method: Method, origin: Origin },
    /// GET requests for URLs listed in the manifest.
    Precache(Arc<PrecacheManifest>),
    Predicate(Predicate),
}

impl Matcher {
    /// Compile a regex matcher. `app_origin` decides what counts as
    /// same-origin.
    pub fn regex(pattern: &str, method: Method, app_origin: &Url) -> Result<Self, Error> {
        let regex = Regex::new(pattern).map_err(|e| Error::InvalidRoute(format!("{pattern}: {e}")))?;
        Ok(Matcher::Regex { regex, method, origin: app_origin.origin() })
    }

    pub fn predicate(f: impl Fn(&Request) -> bool + Send + Sync + 'static) -> Self {
        Matcher::Predicate(Arc::new(f))
    }

    pub fn matches(&self, request: &Request) -> bool {
        match self {
            Matcher::Navigation => request.is_navigation(),
            Matcher::Regex { regex, method, origin } => {
                if &request.method != method {
                    return false;
                }
                let url = request.url.as_str();
                if request.url.origin() == *origin {
                    regex.is_match(url)
                } else {
                    regex.find(url).is_some_and(|m| m.start() == 0)
                }
            }
            Matcher::Precache(manifest) => request.method == Method::GET && manifest.lookup(&request.url).is_some(),
            Matcher::Predicate(f) => f(request),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Navigation => f.write_str("Navigation"),
            Matcher::Regex { regex, method, .. } => write!(f, "Regex({method} {})", regex.as_str()),
            Matcher::Precache(manifest) => write!(f, "Precache({} entries)", manifest.len()),
            Matcher::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

#[derive(Debug)]
struct Route {
    matcher: Matcher,
    handler: Arc<StrategyHandler>,
}

#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route.
    pub fn register(&mut self, matcher: Matcher, handler: StrategyHandler) {
        if matches!(matcher, Matcher::Navigation)
            && let Some(position) = self.routes.iter().position(|r| matches!(r.matcher, Matcher::Navigation))
        {
            tracing::warn!(
                shadowed_by = position,
                strategy = handler.name(),
                "navigation route registered twice; the later one never runs"
            );
        }
        tracing::debug!(route = self.routes.len(), matcher = ?matcher, strategy = handler.name(), "route registered");
        self.routes.push(Route { matcher, handler: Arc::new(handler) });
    }

    /// Handler of the first matching route.
    pub fn dispatch(&self, request: &Request) -> Option<Arc<StrategyHandler>> {
        self.routes
            .iter()
            .find(|route| route.matcher.matches(request))
            .map(|route| Arc::clone(&route.handler))
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Arc<StrategyHandler>> {
        self.routes.iter().map(|route| &route.handler)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precache::ManifestEntry;
    use crate::strategy::StrategyKind;
    use crate::testing::url;

    fn origin() -> Url {
        url("https://app.test")
    }

    #[test]
    fn test_first_registered_route_wins() {
        let mut table = RouteTable::new();
        table.register(
            Matcher::regex(r"\.json$", Method::GET, &origin()).unwrap(),
            StrategyHandler::new(StrategyKind::CacheFirst, "first"),
        );
        table.register(
            Matcher::regex(r"data", Method::GET, &origin()).unwrap(),
            StrategyHandler::new(StrategyKind::NetworkFirst { timeout: None }, "second"),
        );

        let handler = table.dispatch(&Request::get(url("https://app.test/data.json"))).unwrap();
        assert_eq!(handler.cache_name, "first");
        assert_eq!(handler.name(), "cache-first");
    }

    #[test]
    fn test_unmatched_request_has_no_handler() {
        let mut table = RouteTable::new();
        table.register(Matcher::Navigation, StrategyHandler::new(StrategyKind::CacheOnly, "pages"));
        assert!(table.dispatch(&Request::get(url("https://app.test/app.js"))).is_none());
    }

    #[test]
    fn test_navigation_before_extension_routes() {
        let mut table = RouteTable::new();
        table.register(Matcher::Navigation, StrategyHandler::new(StrategyKind::CacheOnly, "pages"));
        table.register(
            Matcher::regex(r"\.html$", Method::GET, &origin()).unwrap(),
            StrategyHandler::new(StrategyKind::CacheFirst, "html"),
        );

        let nav = table.dispatch(&Request::navigate(url("https://app.test/index.html"))).unwrap();
        assert_eq!(nav.cache_name, "pages");
        let sub = table.dispatch(&Request::get(url("https://app.test/index.html"))).unwrap();
        assert_eq!(sub.cache_name, "html");
    }

    #[test]
    fn test_cross_origin_regex_must_match_from_start() {
        let matcher = Matcher::regex(r"\.png$", Method::GET, &origin()).unwrap();
        assert!(matcher.matches(&Request::get(url("https://app.test/logo.png"))));
        assert!(!matcher.matches(&Request::get(url("https://cdn.test/logo.png"))));

        let api = Matcher::regex(r"^(https://dummyjson.com/)", Method::GET, &origin()).unwrap();
        assert!(api.matches(&Request::get(url("https://dummyjson.com/todos"))));
    }

    #[test]
    fn test_regex_method_restriction() {
        let matcher = Matcher::regex(r"/api/v1/auth/", Method::POST, &origin()).unwrap();
        assert!(matcher.matches(&Request::post(url("https://app.test/api/v1/auth/login"), "{}")));
        assert!(!matcher.matches(&Request::get(url("https://app.test/api/v1/auth/login"))));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(Matcher::regex("(", Method::GET, &origin()), Err(Error::InvalidRoute(_))));
    }

    #[test]
    fn test_precache_matcher_uses_manifest_lookup() {
        let manifest = PrecacheManifest::new(
            &[ManifestEntry { url: "/index.html".into(), revision: Some("1".into()) }],
            &origin(),
            &["^utm_".into()],
        )
        .unwrap();
        let matcher = Matcher::Precache(Arc::new(manifest));
        assert!(matcher.matches(&Request::get(url("https://app.test/?utm_medium=x"))));
        assert!(!matcher.matches(&Request::post(url("https://app.test/index.html"), "")));
    }

    #[test]
    fn test_predicate_matcher() {
        let matcher = Matcher::predicate(|r| r.url.path().starts_with("/static/"));
        assert!(matcher.matches(&Request::get(url("https://app.test/static/a.css"))));
    }
}
