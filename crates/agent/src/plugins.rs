//! Typed hooks attached to a strategy handler.
//!
//! Plugins run in registration order at each extension point. A hook that
//! does not apply to a plugin is a no-op for it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use waystation_core::{CacheEntry, Error};

use crate::expiration::ExpirationPolicy;
use crate::precache::FallbackDocument;
use crate::queue::RetryQueue;
use crate::request::{Request, Response, ResponseSource};
use crate::strategy::HandlerContext;

#[derive(Debug, Clone)]
pub enum Plugin {
    /// Only responses with one of these statuses are written.
    CacheableResponse { statuses: Vec<u16> },
    /// Per-store limits and the freshness gate.
    Expiration(ExpirationPolicy),
    /// Enqueue mutating requests that failed for connectivity reasons.
    BackgroundSync(Arc<RetryQueue>),
    /// Serve the pinned offline document when the handler fails.
    OfflineFallback(FallbackDocument),
}

impl Plugin {
    /// Whether `response` may be written to the store.
    pub fn cache_will_update(&self, response: &Response) -> bool {
        match self {
            Plugin::CacheableResponse { statuses } => statuses.contains(&response.status),
            _ => true,
        }
    }

    /// Whether a stored entry may be served ahead of the network.
    pub fn cached_response_will_be_used(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        match self {
            Plugin::Expiration(policy) => policy.is_fresh(&entry.stored_at, now),
            _ => true,
        }
    }

    /// Runs after a successful write to `cache_name`.
    pub fn cache_did_update(&self, ctx: &HandlerContext, cache_name: &str) {
        if let Plugin::Expiration(policy) = self {
            let policy = *policy;
            let db = ctx.db.clone();
            let cache_name = cache_name.to_string();
            ctx.keep_alive.wait_until("expiration", async move {
                policy.enforce(&db, &cache_name).await.map(|_| ())
            });
        }
    }

    /// Runs when the network could not be reached for `request`.
    pub async fn fetch_did_fail(&self, request: &Request) -> Result<(), Error> {
        match self {
            Plugin::BackgroundSync(queue) if request.is_mutating() => {
                queue.push_request(request).await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Last chance to answer a request the strategy could not.
    pub async fn handler_did_error(&self, ctx: &HandlerContext, request: &Request) -> Result<Option<Response>, Error> {
        let Plugin::OfflineFallback(document) = self else {
            return Ok(None);
        };
        if !request.is_navigation() {
            return Ok(None);
        }

        let entry = ctx
            .db
            .get_entry(&document.cache_name, &document.request().fingerprint())
            .await?;
        Ok(entry.map(|entry| Response { source: ResponseSource::Fallback, ..Response::from_entry(entry) }))
    }
}
