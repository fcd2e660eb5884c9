//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (WAYSTATION_*)
//! 2. TOML config file (if WAYSTATION_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod routes;
mod validation;

pub use routes::{RouteConfig, RouteMatch, StrategyName, default_routes};
pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (WAYSTATION_*)
/// 2. TOML config file (if WAYSTATION_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version string reported to `GET_VERSION`.
    #[serde(default = "default_version")]
    pub version: String,

    /// Path to SQLite cache database.
    ///
    /// Set via WAYSTATION_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin the application is served from. Relative manifest URLs resolve
    /// against it, and regex routes may match anywhere in same-origin URLs.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Precache manifest (JSON list of `{url, revision}`).
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via WAYSTATION_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version suffix of every store; bumping it retires the old stores on
    /// the next activation.
    #[serde(default = "default_cache_suffix")]
    pub cache_suffix: String,

    #[serde(default = "default_precache_name")]
    pub precache_name: String,

    #[serde(default = "default_runtime_name")]
    pub runtime_name: String,

    #[serde(default = "default_fallback_cache_name")]
    pub fallback_cache_name: String,

    /// Document served when navigation strategies run out of options.
    #[serde(default)]
    pub offline_fallback_url: Option<String>,

    /// Precached document served for every navigation (single-page app
    /// shell). Disabled when unset.
    #[serde(default)]
    pub app_shell_url: Option<String>,

    /// Activate a new version as soon as it installs.
    #[serde(default)]
    pub skip_waiting: bool,

    /// Take control of open clients on activation.
    #[serde(default = "default_true")]
    pub clients_claim: bool,

    /// Query parameters (regexes over the name) ignored when matching
    /// precached URLs.
    #[serde(default = "default_ignore_url_parameters")]
    pub ignore_url_parameters: Vec<String>,

    #[serde(default = "default_retry_queue_name")]
    pub retry_queue_name: String,

    /// How long a failed request may wait for replay.
    #[serde(default = "default_retry_retention_minutes")]
    pub retry_retention_minutes: u64,

    /// Seconds between periodic replay attempts.
    #[serde(default = "default_replay_interval_secs")]
    pub replay_interval_secs: u64,

    /// Seconds between expiration sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Queue failed mutating requests that no route claims.
    #[serde(default = "default_true")]
    pub queue_failed_mutations: bool,

    #[serde(default = "default_routes")]
    pub routes: Vec<RouteConfig>,
}

fn default_version() -> String {
    "1.0.0".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./waystation-cache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_user_agent() -> String {
    "waystation/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_cache_prefix() -> String {
    "todo-app".into()
}

fn default_cache_suffix() -> String {
    "v1".into()
}

fn default_precache_name() -> String {
    "install-time".into()
}

fn default_runtime_name() -> String {
    "run-time".into()
}

fn default_fallback_cache_name() -> String {
    "offline-fallback".into()
}

fn default_ignore_url_parameters() -> Vec<String> {
    vec!["^utm_".into(), "^fbclid$".into()]
}

fn default_retry_queue_name() -> String {
    "FAILED_API_REQUEST_QUEUE".into()
}

fn default_retry_retention_minutes() -> u64 {
    24 * 60
}

fn default_replay_interval_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            db_path: default_db_path(),
            origin: default_origin(),
            manifest_path: None,
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            cache_prefix: default_cache_prefix(),
            cache_suffix: default_cache_suffix(),
            precache_name: default_precache_name(),
            runtime_name: default_runtime_name(),
            fallback_cache_name: default_fallback_cache_name(),
            offline_fallback_url: Some("/offline.html".into()),
            app_shell_url: None,
            skip_waiting: false,
            clients_claim: true,
            ignore_url_parameters: default_ignore_url_parameters(),
            retry_queue_name: default_retry_queue_name(),
            retry_retention_minutes: default_retry_retention_minutes(),
            replay_interval_secs: default_replay_interval_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            queue_failed_mutations: true,
            routes: default_routes(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Retry queue retention window.
    pub fn retry_retention(&self) -> Duration {
        Duration::from_secs(self.retry_retention_minutes.saturating_mul(60))
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_secs(self.replay_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `WAYSTATION_`
    /// 2. TOML file from `WAYSTATION_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("WAYSTATION_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("WAYSTATION_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
