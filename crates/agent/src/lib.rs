//! The waystation caching agent.
//!
//! This crate resolves application requests through an ordered route table
//! to cache strategies backed by the SQLite stores of `waystation-core`, and
//! drives the install/activate lifecycle shared by the host binary.

pub mod expiration;
pub mod fetch;
pub mod keepalive;
pub mod lifecycle;
pub mod plugins;
pub mod precache;
pub mod queue;
pub mod request;
pub mod routing;
pub mod storage;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

pub use expiration::ExpirationPolicy;
pub use fetch::{FetchConfig, HttpNetwork, Network};
pub use keepalive::KeepAlive;
pub use lifecycle::{
    AgentVersion, ClientId, ControlMessage, ControlReply, FetchOutcome, Registration, Signal, Slot, VersionId, WorkerState,
};
pub use plugins::Plugin;
pub use precache::{FallbackDocument, InstallReport, ManifestEntry, PrecacheEntry, PrecacheManifest, Precacher};
pub use queue::{ReplayReport, RetryQueue};
pub use request::{Headers, Request, RequestMode, Response, ResponseSource};
pub use routing::{Matcher, RouteTable};
pub use storage::CacheNames;
pub use strategy::{HandlerContext, StrategyHandler, StrategyKind};
