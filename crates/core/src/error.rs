//! Unified error types for waystation.
//!
//! Request-level variants (`CacheMiss`, `NetworkFailure`, ...) are recovered
//! from inside the agent; the rest surface to the host.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the waystation agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty URL, unknown method).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Route pattern failed to compile or names an unknown strategy.
    #[error("INVALID_ROUTE: {0}")]
    InvalidRoute(String),

    /// Lifecycle transition not allowed from the current state.
    #[error("INVALID_STATE: {0}")]
    InvalidState(String),

    /// Precache manifest could not be read or parsed.
    #[error("MANIFEST_ERROR: {0}")]
    Manifest(String),

    /// No entry for the request in the target store.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// The network could not be reached.
    #[error("NETWORK_FAILURE: {0}")]
    NetworkFailure(String),

    /// The network did not answer within the configured timeout.
    #[error("NETWORK_TIMEOUT: {0}")]
    NetworkTimeout(String),

    /// Neither the network nor any store could answer the request.
    #[error("NO_FALLBACK_AVAILABLE: {0}")]
    NoFallbackAvailable(String),

    /// A manifest asset could not be fetched during install.
    #[error("PRECACHE_ASSET_UNAVAILABLE: {0}")]
    PrecacheAssetUnavailable(String),

    /// A retry task outlived the queue retention window.
    #[error("QUEUE_RETENTION_EXPIRED: {0}")]
    QueueRetentionExpired(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored data could not be encoded or decoded.
    #[error("CACHE_ERROR: serialization failed: {0}")]
    Serialization(String),
}

impl Error {
    /// Connectivity failures, the only errors that make a mutating request
    /// eligible for the retry queue.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::NetworkFailure(_) | Error::NetworkTimeout(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::InvalidRoute(msg) => (-32013, msg.clone()),
            Error::InvalidState(msg) => (-32014, msg.clone()),
            Error::Manifest(msg) => (-32015, msg.clone()),
            Error::CacheMiss(msg) => (-32001, msg.clone()),
            Error::NetworkFailure(msg) => (-32008, msg.clone()),
            Error::NetworkTimeout(msg) => (-32006, msg.clone()),
            Error::NoFallbackAvailable(msg) => (-32016, msg.clone()),
            Error::PrecacheAssetUnavailable(msg) => (-32017, msg.clone()),
            Error::QueueRetentionExpired(msg) => (-32018, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::Serialization(msg) => (-32002, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CacheMiss("abc123".to_string());
        assert!(err.to_string().contains("CACHE_MISS"));
        assert!(err.to_string().contains("abc123"));
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::CacheMiss("abc123".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32001);
    }

    #[test]
    fn test_connectivity_classification() {
        assert!(Error::NetworkFailure("offline".into()).is_connectivity());
        assert!(Error::NetworkTimeout("30s".into()).is_connectivity());
        assert!(!Error::CacheMiss("k".into()).is_connectivity());
        assert!(!Error::NoFallbackAvailable("k".into()).is_connectivity());
    }
}
