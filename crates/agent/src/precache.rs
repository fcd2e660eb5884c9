//! Precache manager.
//!
//! ### Manifest
//! - A JSON list of `{ "url": ..., "revision": ... }` produced by the build.
//! - Entries with a revision are stored under the URL plus a
//!   `__WB_REVISION__` query parameter, so a changed revision is a new key
//!   and an unchanged one is skipped on the next install.
//!
//! ### Install / activate
//! - Install fetches every missing asset before writing anything, then
//!   writes them in one transaction. Any unreachable asset aborts the
//!   install with `PrecacheAssetUnavailable`.
//! - Activate deletes every precache entry the current manifest no longer
//!   names.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;
use waystation_core::cache::format_timestamp;
use waystation_core::cache::hash::compute_cache_key;
use waystation_core::{CacheDb, CacheEntry, Error};

use crate::fetch::{Network, resolve, strip_ignored_params};
use crate::request::{Request, Response};

const REVISION_PARAM: &str = "__WB_REVISION__";

/// One line of the build manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    /// Content hash; `None` when the file name already carries one.
    #[serde(default)]
    pub revision: Option<String>,
}

/// A manifest entry resolved against the application origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecacheEntry {
    pub url: Url,
    pub cache_key_url: Url,
    pub key: String,
}

#[derive(Debug, Clone, Default)]
pub struct PrecacheManifest {
    entries: Vec<PrecacheEntry>,
    by_url: HashMap<String, usize>,
    ignore: Vec<Regex>,
}

impl PrecacheManifest {
    /// Resolve and index manifest entries.
    ///
    /// `ignore_params` are regexes over query parameter names stripped before
    /// lookups (tracking parameters and the like).
    pub fn new(entries: &[ManifestEntry], origin: &Url, ignore_params: &[String]) -> Result<Self, Error> {
        let ignore = ignore_params
            .iter()
            .map(|p| Regex::new(p).map_err(|e| Error::Manifest(format!("bad ignored parameter {p:?}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;

        let mut manifest = Self { entries: Vec::with_capacity(entries.len()), by_url: HashMap::new(), ignore };
        let mut revisions: HashMap<String, Option<String>> = HashMap::new();

        for entry in entries {
            let url = resolve(origin, &entry.url)?;
            match revisions.get(url.as_str()) {
                Some(previous) if previous != &entry.revision => {
                    return Err(Error::Manifest(format!("conflicting revisions for {url}")));
                }
                Some(_) => continue,
                None => {}
            }
            revisions.insert(url.to_string(), entry.revision.clone());

            let mut cache_key_url = url.clone();
            if let Some(revision) = &entry.revision {
                cache_key_url.query_pairs_mut().append_pair(REVISION_PARAM, revision);
            }
            let key = compute_cache_key("GET", cache_key_url.as_str(), "");

            manifest.by_url.insert(url.to_string(), manifest.entries.len());
            manifest.entries.push(PrecacheEntry { url, cache_key_url, key });
        }

        Ok(manifest)
    }

    /// Parse a manifest from its JSON form.
    pub fn from_json(json: &str, origin: &Url, ignore_params: &[String]) -> Result<Self, Error> {
        let entries: Vec<ManifestEntry> =
            serde_json::from_str(json).map_err(|e| Error::Manifest(format!("invalid manifest: {e}")))?;
        Self::new(&entries, origin, ignore_params)
    }

    /// Read a manifest file.
    pub async fn load(path: impl AsRef<Path>, origin: &Url, ignore_params: &[String]) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Manifest(format!("{}: {e}", path.display())))?;
        Self::from_json(&json, origin, ignore_params)
    }

    pub fn entries(&self) -> &[PrecacheEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Storage keys of every entry.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }

    /// Find the entry serving `url`.
    ///
    /// Fragments and ignored query parameters are dropped first; a directory
    /// URL also matches its `index.html`.
    pub fn lookup(&self, url: &Url) -> Option<&PrecacheEntry> {
        let mut candidate = strip_ignored_params(url, &self.ignore);
        candidate.set_fragment(None);

        if let Some(&index) = self.by_url.get(candidate.as_str()) {
            return self.entries.get(index);
        }

        if candidate.path().ends_with('/') {
            let path = format!("{}index.html", candidate.path());
            candidate.set_path(&path);
            return self.by_url.get(candidate.as_str()).and_then(|&i| self.entries.get(i));
        }
        None
    }
}

/// The offline document and the store it is pinned in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackDocument {
    pub cache_name: String,
    pub url: Url,
}

impl FallbackDocument {
    pub fn request(&self) -> Request {
        Request::get(self.url.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub fetched: usize,
    pub skipped: usize,
}

/// Installs and activates one version's precache.
#[derive(Debug, Clone)]
pub struct Precacher {
    pub cache_name: String,
    pub manifest: Arc<PrecacheManifest>,
    pub fallback: Option<FallbackDocument>,
}

fn unavailable(url: &Url, reason: impl std::fmt::Display) -> Error {
    Error::PrecacheAssetUnavailable(format!("{url}: {reason}"))
}

async fn fetch_asset(network: &dyn Network, url: &Url) -> Result<Response, Error> {
    let response = network
        .fetch(&Request::get(url.clone()))
        .await
        .map_err(|e| unavailable(url, e))?;
    if !response.is_ok() {
        return Err(unavailable(url, format!("status {}", response.status)));
    }
    Ok(response)
}

impl Precacher {
    /// Fetch every asset that is not stored yet, plus the fallback document.
    ///
    /// Nothing is written unless every fetch succeeds.
    pub async fn install(&self, db: &CacheDb, network: &dyn Network) -> Result<InstallReport, Error> {
        let mut report = InstallReport::default();
        let mut staged: Vec<CacheEntry> = Vec::new();
        let stored_at = format_timestamp(&chrono::Utc::now());

        for entry in self.manifest.entries() {
            if db.get_entry(&self.cache_name, &entry.key).await?.is_some() {
                report.skipped += 1;
                continue;
            }

            let response = fetch_asset(network, &entry.url).await?;
            staged.push(CacheEntry {
                cache_name: self.cache_name.clone(),
                key: entry.key.clone(),
                method: "GET".to_string(),
                url: entry.cache_key_url.to_string(),
                status: response.status,
                headers: response.headers,
                body: response.body.to_vec(),
                stored_at: stored_at.clone(),
            });
            report.fetched += 1;
        }

        if let Some(fallback) = &self.fallback {
            let response = fetch_asset(network, &fallback.url).await?;
            staged.push(response.to_entry(&fallback.cache_name, &fallback.request()));
        }

        db.put_entries(staged).await?;
        tracing::info!(
            cache = %self.cache_name,
            fetched = report.fetched,
            skipped = report.skipped,
            "precache installed"
        );
        Ok(report)
    }

    /// Remove entries of superseded revisions. Returns the number deleted.
    pub async fn activate(&self, db: &CacheDb) -> Result<u64, Error> {
        let deleted = db.retain_entries(&self.cache_name, self.manifest.keys()).await?;
        if deleted > 0 {
            tracing::info!(cache = %self.cache_name, deleted, "removed outdated precache entries");
        }
        Ok(deleted)
    }
}
