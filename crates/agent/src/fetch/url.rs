//! URL canonicalization for consistent cache keys and route matching.

use regex::Regex;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<UrlError> for waystation_core::Error {
    fn from(err: UrlError) -> Self {
        waystation_core::Error::InvalidUrl(err.to_string())
    }
}

/// Resolve a possibly relative URL (`/app.js`, `./index.html`) against the
/// application origin.
///
/// The result is an http(s) URL without a fragment; the query string is
/// kept in its original order.
pub fn resolve(origin: &url::Url, input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }
    let mut parsed = origin.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }
    parsed.set_fragment(None);

    Ok(parsed)
}

/// Drop query parameters whose name matches any of `ignore`.
///
/// The remaining parameters keep their order; an emptied query is removed.
pub fn strip_ignored_params(url: &url::Url, ignore: &[Regex]) -> url::Url {
    let mut out = url.clone();
    if ignore.is_empty() || url.query().is_none() {
        return out;
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !ignore.iter().any(|re| re.is_match(name)))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        out.set_query(None);
    } else {
        out.query_pairs_mut().clear().extend_pairs(kept);
    }
    out
}
