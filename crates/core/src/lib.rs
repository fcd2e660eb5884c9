//! Core types and shared functionality for waystation.
//!
//! This crate provides:
//! - Cache storage with a SQLite backend (named stores, entries, retry queue)
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheEntry, CacheEntryMeta, NewRetryTask, RetryTask};
pub use config::{AppConfig, ConfigError, RouteConfig};
pub use error::Error;
