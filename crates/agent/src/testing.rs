//! Scripted network double shared by the agent tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;
use waystation_core::{CacheDb, Error};

use crate::fetch::Network;
use crate::keepalive::KeepAlive;
use crate::request::{Request, Response};
use crate::strategy::HandlerContext;

#[derive(Default)]
pub struct MockNetwork {
    responses: Mutex<HashMap<String, (u16, String)>>,
    delays: Mutex<HashMap<String, Duration>>,
    unreachable: Mutex<Vec<String>>,
    offline: AtomicBool,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `url` with `status` and `body` from now on.
    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_string()));
    }

    /// Delay every answer for `url`.
    pub fn delay(&self, url: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
    }

    /// Fail requests to `url` with a connectivity error.
    pub fn unreachable(&self, url: &str) {
        self.unreachable.lock().unwrap().push(url.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of requests made to `url`.
    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(_, u)| u == url).count()
    }

    /// All requests made, as `(method, url)`, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url.to_string();
        self.calls
            .lock()
            .unwrap()
            .push((request.method.to_string(), url.clone()));

        let delay = self.delays.lock().unwrap().get(&url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.offline.load(Ordering::SeqCst) || self.unreachable.lock().unwrap().contains(&url) {
            return Err(Error::NetworkFailure(format!("offline: {url}")));
        }

        let scripted = self.responses.lock().unwrap().get(&url).cloned();
        Ok(match scripted {
            Some((status, body)) => Response::new(status, body),
            None => Response::new(404, "not found"),
        })
    }
}

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

/// Fresh in-memory database, scripted network and keep-alive tracker.
pub async fn context() -> (HandlerContext, Arc<MockNetwork>) {
    let db = CacheDb::open_in_memory().await.unwrap();
    let network = MockNetwork::new();
    let ctx = HandlerContext { db, network: network.clone(), keep_alive: KeepAlive::new() };
    (ctx, network)
}
