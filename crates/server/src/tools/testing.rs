//! Shared fixtures for tool tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::model::CallToolResult;
use url::Url;
use waystation_agent::{AgentVersion, Network, PrecacheManifest, Registration, Request, Response, RetryQueue};
use waystation_core::{AppConfig, CacheDb, Error};

/// Answers every request with 200 and `"{METHOD} {URL}"`.
struct EchoNetwork;

#[async_trait]
impl Network for EchoNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        Ok(Response::new(200, format!("{} {}", request.method, request.url)))
    }
}

/// An installed registration on an in-memory database.
pub async fn registration() -> (Arc<Registration>, Url) {
    let config = AppConfig { origin: "https://app.test".into(), ..AppConfig::default() };
    let origin = Url::parse(&config.origin).unwrap();

    let db = CacheDb::open_in_memory().await.unwrap();
    let queue = Arc::new(RetryQueue::new(db.clone(), &config.retry_queue_name, Duration::from_secs(3600)));
    let registration = Arc::new(Registration::new(db, Arc::new(EchoNetwork), Arc::clone(&queue)));

    let version = AgentVersion::from_config(&config, PrecacheManifest::default(), queue).unwrap();
    registration.install(version).await.unwrap();
    (registration, origin)
}

/// Text of the first content block.
pub fn text(result: &CallToolResult) -> String {
    let content = serde_json::to_value(&result.content[0]).unwrap();
    content.get("text").and_then(|v| v.as_str()).unwrap().to_string()
}
