//! Declarative route definitions.
//!
//! Each route pairs a matcher with a named strategy and its options. Routes
//! are evaluated in the order they appear in the configuration.

use serde::{Deserialize, Serialize};

const DAY_IN_SECONDS: u64 = 24 * 60 * 60;
const MONTH_IN_SECONDS: u64 = DAY_IN_SECONDS * 30;
const NETWORK_TIMEOUT_IN_SECONDS: u64 = 30;

/// What a route matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteMatch {
    /// Top-level document loads.
    Navigation,
    /// A regular expression over the full request URL.
    Regex,
}

/// Strategy names accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyName {
    CacheOnly,
    NetworkOnly,
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

/// One entry of the route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(rename = "match")]
    pub matcher: RouteMatch,

    /// Regex source, required when `match = "regex"`.
    #[serde(default)]
    pub pattern: Option<String>,

    /// Restrict the route to one HTTP method (default: GET).
    #[serde(default)]
    pub method: Option<String>,

    pub strategy: StrategyName,

    /// Logical store name; the runtime store is used when absent.
    #[serde(default)]
    pub cache_name: Option<String>,

    #[serde(default)]
    pub max_entries: Option<usize>,

    #[serde(default)]
    pub max_age_seconds: Option<u64>,

    #[serde(default)]
    pub network_timeout_seconds: Option<u64>,

    /// Response statuses eligible for caching (default: `[200]`).
    #[serde(default)]
    pub statuses: Option<Vec<u16>>,

    /// Queue failed mutating requests for replay.
    #[serde(default)]
    pub background_sync: bool,

    /// Serve the offline fallback document when the strategy fails.
    #[serde(default)]
    pub offline_fallback: bool,
}

impl RouteConfig {
    fn new(matcher: RouteMatch, pattern: Option<&str>, strategy: StrategyName) -> Self {
        Self {
            matcher,
            pattern: pattern.map(str::to_string),
            method: None,
            strategy,
            cache_name: None,
            max_entries: None,
            max_age_seconds: None,
            network_timeout_seconds: None,
            statuses: None,
            background_sync: false,
            offline_fallback: false,
        }
    }

    /// A route matching navigation requests.
    pub fn navigation(strategy: StrategyName) -> Self {
        Self::new(RouteMatch::Navigation, None, strategy)
    }

    /// A route matching URLs against `pattern`.
    pub fn regex(pattern: &str, strategy: StrategyName) -> Self {
        Self::new(RouteMatch::Regex, Some(pattern), strategy)
    }

    /// Whether the route has an expiration policy attached.
    pub fn is_bounded(&self) -> bool {
        self.max_entries.is_some() || self.max_age_seconds.is_some()
    }
}

/// The route table shipped with the agent.
///
/// Navigations go network-first with the offline document as the last
/// resort, ahead of the file-extension routes. Auth calls never touch a
/// store; failed auth POSTs are queued for replay.
pub fn default_routes() -> Vec<RouteConfig> {
    vec![
        RouteConfig {
            cache_name: Some("navigations".into()),
            network_timeout_seconds: Some(NETWORK_TIMEOUT_IN_SECONDS),
            offline_fallback: true,
            ..RouteConfig::navigation(StrategyName::NetworkFirst)
        },
        RouteConfig::regex(r"\.(?:js|css)$", StrategyName::StaleWhileRevalidate),
        RouteConfig {
            cache_name: Some("images".into()),
            max_entries: Some(250),
            max_age_seconds: Some(MONTH_IN_SECONDS),
            ..RouteConfig::regex(r"\.(?:png|gif|jpg|jpeg|svg)$", StrategyName::CacheFirst)
        },
        RouteConfig {
            method: Some("POST".into()),
            background_sync: true,
            ..RouteConfig::regex(r"(https://)?([^/\s]+/)api/v1/auth/.*", StrategyName::NetworkOnly)
        },
        RouteConfig {
            cache_name: Some("api-cache".into()),
            statuses: Some(vec![200]),
            max_entries: Some(50),
            max_age_seconds: Some(7 * DAY_IN_SECONDS),
            ..RouteConfig::regex(r"^(https://dummyjson.com/)", StrategyName::StaleWhileRevalidate)
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_routes_put_navigation_first() {
        let routes = default_routes();
        assert_eq!(routes[0].matcher, RouteMatch::Navigation);
        assert!(routes[0].offline_fallback);
        assert_eq!(routes.iter().filter(|r| r.matcher == RouteMatch::Navigation).count(), 1);
    }

    #[test]
    fn test_default_image_route_is_bounded() {
        let images = default_routes()
            .into_iter()
            .find(|r| r.cache_name.as_deref() == Some("images"))
            .unwrap();
        assert_eq!(images.strategy, StrategyName::CacheFirst);
        assert_eq!(images.max_entries, Some(250));
        assert_eq!(images.max_age_seconds, Some(MONTH_IN_SECONDS));
        assert!(images.is_bounded());
    }

    #[test]
    fn test_route_toml_shape() {
        let route: RouteConfig = toml_route(
            r#"
            match = "regex"
            pattern = "\\.json$"
            strategy = "network-first"
            network_timeout_seconds = 3
            "#,
        );
        assert_eq!(route.matcher, RouteMatch::Regex);
        assert_eq!(route.strategy, StrategyName::NetworkFirst);
        assert_eq!(route.network_timeout_seconds, Some(3));
        assert!(!route.background_sync);
    }

    fn toml_route(src: &str) -> RouteConfig {
        use figment::{
            Figment,
            providers::{Format, Toml},
        };
        Figment::from(Toml::string(src)).extract().unwrap()
    }
}
