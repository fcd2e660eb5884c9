//! MCP tool implementations.
//!
//! This module contains all tools exposed by the waystation server.

pub mod cache;
pub mod client;
pub mod fetch;
pub mod install;
pub mod message;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheGetParams, CachePurgeParams};
pub use client::ClientDisconnectParams;
pub use fetch::FetchParams;
pub use install::InstallParams;
pub use message::MessageParams;
pub use sync::SyncParams;
