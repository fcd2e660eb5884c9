//! Store naming.
//!
//! Every store is identified by `(prefix, name, suffix)` and rendered as
//! `{prefix}-{name}-{suffix}`. Bumping the suffix retires every store of the
//! previous version at the next activation.

use waystation_core::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    pub prefix: String,
    pub suffix: String,
    precache: String,
    runtime: String,
    fallback: String,
}

impl CacheNames {
    pub fn new(prefix: &str, suffix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            precache: "install-time".to_string(),
            runtime: "run-time".to_string(),
            fallback: "offline-fallback".to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            precache: config.precache_name.clone(),
            runtime: config.runtime_name.clone(),
            fallback: config.fallback_cache_name.clone(),
            ..Self::new(&config.cache_prefix, &config.cache_suffix)
        }
    }

    /// Full store name for a logical name.
    pub fn qualify(&self, name: &str) -> String {
        format!("{}-{}-{}", self.prefix, name, self.suffix)
    }

    pub fn precache(&self) -> String {
        self.qualify(&self.precache)
    }

    pub fn runtime(&self) -> String {
        self.qualify(&self.runtime)
    }

    pub fn fallback(&self) -> String {
        self.qualify(&self.fallback)
    }

    /// A store of this agent family written by another version.
    pub fn is_outdated(&self, store: &str) -> bool {
        store.starts_with(&format!("{}-", self.prefix)) && !store.ends_with(&format!("-{}", self.suffix))
    }
}
