//! Request fingerprints used as cache entry keys.

use sha2::{Digest, Sha256};

/// Compute the fingerprint of a request: method, canonical URL and the
/// request headers the response varies on.
///
/// The method is upper-cased so `get` and `GET` share an entry.
pub fn compute_cache_key(method: &str, url: &str, vary_headers: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(vary_headers.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check that a key looks like a fingerprint produced by [`compute_cache_key`].
pub fn is_valid_key(key: &str) -> bool {
    key.len() == 64 && key.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("GET", "https://example.com/", "");
        let hash2 = compute_cache_key("GET", "https://example.com/", "");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_method_case_insensitive() {
        assert_eq!(
            compute_cache_key("get", "https://example.com/", ""),
            compute_cache_key("GET", "https://example.com/", "")
        );
    }

    #[test]
    fn test_hash_different_method() {
        let get = compute_cache_key("GET", "https://example.com/", "");
        let post = compute_cache_key("POST", "https://example.com/", "");
        assert_ne!(get, post);
    }

    #[test]
    fn test_hash_different_headers() {
        let hash1 = compute_cache_key("GET", "https://example.com/", "accept:text/html");
        let hash2 = compute_cache_key("GET", "https://example.com/", "accept:application/json");
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_cache_key("GET", "https://example.com/", "");
        assert!(is_valid_key(&hash));
        assert!(!is_valid_key("not-a-key"));
    }
}
