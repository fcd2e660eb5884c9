//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, RouteMatch, StrategyName};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

const MAX_RETRY_RETENTION_MINUTES: u64 = 365 * 24 * 60;

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `version`, `user_agent` or any store name part is empty
    /// - `origin` is not an absolute http(s) URL
    /// - `retry_retention_minutes` is 0 or longer than a year
    /// - a route is inconsistent (regex without pattern, zero limits, ...)
    ///
    /// Regex syntax is checked when the route table is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        for (field, value) in [
            ("version", &self.version),
            ("user_agent", &self.user_agent),
            ("cache_prefix", &self.cache_prefix),
            ("cache_suffix", &self.cache_suffix),
            ("precache_name", &self.precache_name),
            ("runtime_name", &self.runtime_name),
            ("fallback_cache_name", &self.fallback_cache_name),
            ("retry_queue_name", &self.retry_queue_name),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }

        if !(self.origin.starts_with("http://") || self.origin.starts_with("https://")) {
            return Err(invalid("origin", "must be an absolute http(s) URL"));
        }

        if self.retry_retention_minutes == 0 {
            return Err(invalid("retry_retention_minutes", "must be greater than 0"));
        }
        if self.retry_retention_minutes > MAX_RETRY_RETENTION_MINUTES {
            return Err(invalid("retry_retention_minutes", "must not exceed 365 days (525600 minutes)"));
        }
        if self.replay_interval_secs == 0 || self.sweep_interval_secs == 0 {
            return Err(invalid("replay_interval_secs", "intervals must be greater than 0"));
        }

        for (index, route) in self.routes.iter().enumerate() {
            let field = format!("routes[{index}]");
            match route.matcher {
                RouteMatch::Regex if route.pattern.as_deref().is_none_or(str::is_empty) => {
                    return Err(invalid(field, "regex routes need a pattern"));
                }
                RouteMatch::Navigation if route.pattern.is_some() => {
                    return Err(invalid(field, "navigation routes take no pattern"));
                }
                _ => {}
            }
            if route.max_entries == Some(0) {
                return Err(invalid(field, "max_entries must be greater than 0"));
            }
            if route.max_age_seconds == Some(0) {
                return Err(invalid(field, "max_age_seconds must be greater than 0"));
            }
            if route.network_timeout_seconds == Some(0) {
                return Err(invalid(field, "network_timeout_seconds must be greater than 0"));
            }
            if route.network_timeout_seconds.is_some()
                && !matches!(route.strategy, StrategyName::NetworkOnly | StrategyName::NetworkFirst)
            {
                return Err(invalid(field, "network_timeout_seconds only applies to network strategies"));
            }
            if route.statuses.as_ref().is_some_and(Vec::is_empty) {
                return Err(invalid(field, "statuses must not be empty"));
            }
        }

        let navigation_routes = self
            .routes
            .iter()
            .filter(|r| r.matcher == RouteMatch::Navigation)
            .count();
        if navigation_routes > 1 || (navigation_routes > 0 && self.app_shell_url.is_some()) {
            tracing::warn!(
                navigation_routes,
                app_shell = self.app_shell_url.is_some(),
                "Several routes match navigations; only the first registered one will ever run"
            );
        }

        Ok(())
    }

    /// The offline fallback URL, for features that cannot run without it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no fallback document is configured.
    pub fn require_offline_fallback(&self) -> Result<&str, ConfigError> {
        self.offline_fallback_url.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "offline_fallback_url".into(),
            hint: "Set WAYSTATION_OFFLINE_FALLBACK_URL or offline_fallback_url in the config file".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_max_bytes_zero() {
        let config = AppConfig { max_bytes: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "max_bytes"));
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_empty_version() {
        let config = AppConfig { version: String::new(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "version"));
    }

    #[test]
    fn test_validate_relative_origin() {
        let config = AppConfig { origin: "localhost".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "origin"));
    }

    #[test]
    fn test_validate_regex_route_without_pattern() {
        let mut route = RouteConfig::regex("x", StrategyName::CacheFirst);
        route.pattern = None;
        let config = AppConfig { routes: vec![route], ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "routes[0]"));
    }

    #[test]
    fn test_validate_timeout_on_cache_strategy() {
        let route = RouteConfig {
            network_timeout_seconds: Some(3),
            ..RouteConfig::regex(r"\.png$", StrategyName::CacheFirst)
        };
        let config = AppConfig { routes: vec![route], ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_max_entries() {
        let route = RouteConfig { max_entries: Some(0), ..RouteConfig::regex(r"\.png$", StrategyName::CacheFirst) };
        let config = AppConfig { routes: vec![route], ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_network_timeout() {
        let route = RouteConfig {
            network_timeout_seconds: Some(0),
            ..RouteConfig::regex(r"/api/", StrategyName::NetworkFirst)
        };
        let config = AppConfig { routes: vec![route], ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "routes[0]"));
    }

    #[test]
    fn test_validate_retry_retention_bounds() {
        let config = AppConfig { retry_retention_minutes: u64::MAX, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "retry_retention_minutes"));

        let config = AppConfig { retry_retention_minutes: 365 * 24 * 60, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_require_offline_fallback() {
        let config = AppConfig { offline_fallback_url: None, ..Default::default() };
        assert!(matches!(config.require_offline_fallback(), Err(ConfigError::Missing { .. })));
        assert_eq!(AppConfig::default().require_offline_fallback().unwrap(), "/offline.html");
    }
}
