//! waystation server entry point.
//!
//! Boots the caching agent from configuration and serves it over MCP on the
//! stdio transport. Logging goes to stderr to avoid interfering with the
//! JSON-RPC protocol on stdout.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;
use url::Url;
use waystation_agent::{FetchConfig, HttpNetwork, Registration, RetryQueue};
use waystation_core::{AppConfig, CacheDb};

mod error;
mod handler;
mod tools;

/// Open the stores, install the configured version and return the
/// registration, active unless the install failed.
async fn boot(config: &AppConfig) -> Result<Arc<Registration>> {
    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let network = Arc::new(HttpNetwork::new(FetchConfig::from(config))?);
    let queue = Arc::new(RetryQueue::new(db.clone(), &config.retry_queue_name, config.retry_retention()));

    let registration = Arc::new(Registration::new(db, network, Arc::clone(&queue)));
    let version = tools::install::build_version(config, queue).await?;
    if let Err(e) = registration.install(version).await {
        tracing::error!(error = %e, "install failed; requests pass through until the next install");
    }
    Ok(registration)
}

/// Run `work` every `period` until the process exits.
fn every<F, Fut>(period: Duration, label: &'static str, work: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<(), waystation_core::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = work().await {
                tracing::warn!(task = label, error = %e, "periodic task failed");
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(version = %config.version, db = %config.db_path.display(), "Starting waystation on stdio transport");

    let registration = boot(&config).await?;
    let origin = Url::parse(&config.origin)?;

    let replay = Arc::clone(&registration);
    every(config.replay_interval(), "replay", move || {
        let registration = Arc::clone(&replay);
        async move { registration.sync().await.map(|_| ()) }
    });
    let sweep = Arc::clone(&registration);
    every(config.sweep_interval(), "sweep", move || {
        let registration = Arc::clone(&sweep);
        async move { registration.sweep().await.map(|_| ()) }
    });

    let handler = handler::WaystationServer::new(Arc::clone(&registration), origin);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    registration.keep_alive().settled().await;
    Ok(())
}
