//! Request and response values passed between the host, the strategies and
//! the network.

use std::collections::BTreeMap;

use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;
use waystation_core::cache::format_timestamp;
use waystation_core::cache::hash::compute_cache_key;
use waystation_core::{CacheEntry, Error, NewRetryTask, RetryTask};

/// Header map with lower-cased names.
pub type Headers = BTreeMap<String, String>;

/// How the request was issued by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level document load.
    Navigate,
    SameOrigin,
    #[default]
    Cors,
    NoCors,
}

/// An application request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: Bytes,
    pub mode: RequestMode,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: Headers::new(), body: Bytes::new(), mode: RequestMode::default() }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// A navigation (top-level HTML load).
    pub fn navigate(url: Url) -> Self {
        Self { mode: RequestMode::Navigate, ..Self::get(url) }
    }

    pub fn post(url: Url, body: impl Into<Bytes>) -> Self {
        Self { body: body.into(), ..Self::new(Method::POST, url) }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate && self.method == Method::GET
    }

    /// Requests whose replay changes server state.
    pub fn is_mutating(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
    }

    /// The URL used for cache keys: fragment removed.
    pub fn cache_url(&self) -> Url {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url
    }

    /// Cache entry key of this request.
    pub fn fingerprint(&self) -> String {
        compute_cache_key(self.method.as_str(), self.cache_url().as_str(), "")
    }

    /// Capture the request for the retry queue.
    pub fn snapshot(&self) -> NewRetryTask {
        NewRetryTask {
            method: self.method.to_string(),
            url: self.url.to_string(),
            headers: self.headers.clone(),
            body: self.body.to_vec(),
            enqueued_at: format_timestamp(&chrono::Utc::now()),
        }
    }

    /// Rebuild a request captured by [`Request::snapshot`].
    pub fn from_task(task: &RetryTask) -> Result<Self, Error> {
        let method = Method::from_bytes(task.method.as_bytes())
            .map_err(|_| Error::InvalidInput(format!("unknown method {}", task.method)))?;
        let url = Url::parse(&task.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            method,
            url,
            headers: task.headers.clone(),
            body: Bytes::from(task.body.clone()),
            mode: RequestMode::Cors,
        })
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseSource {
    Network,
    Cache,
    /// The offline fallback document.
    Fallback,
    /// Synthesised network error (status 0).
    Error,
}

/// A response handed back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self { status, headers: Headers::new(), body: body.into(), source: ResponseSource::Network }
    }

    /// The network-error response returned when nothing could answer.
    pub fn error() -> Self {
        Self { status: 0, headers: Headers::new(), body: Bytes::new(), source: ResponseSource::Error }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// 2xx status.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_error(&self) -> bool {
        self.source == ResponseSource::Error
    }

    pub fn from_entry(entry: CacheEntry) -> Self {
        Self {
            status: entry.status,
            headers: entry.headers,
            body: Bytes::from(entry.body),
            source: ResponseSource::Cache,
        }
    }

    /// Build the store entry for this response under `request`'s key.
    pub fn to_entry(&self, cache_name: &str, request: &Request) -> CacheEntry {
        CacheEntry {
            cache_name: cache_name.to_string(),
            key: request.fingerprint(),
            method: request.method.to_string(),
            url: request.cache_url().to_string(),
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.to_vec(),
            stored_at: format_timestamp(&chrono::Utc::now()),
        }
    }
}
