//! Lifecycle controller.
//!
//! ### Versions
//! - `install` runs the precache; success parks the version in the waiting
//!   slot, failure makes it redundant and leaves the active version alone.
//! - A waiting version activates when nothing is active, when the active
//!   version controls no clients, or on `SKIP_WAITING`.
//! - Activation drops superseded precache entries and stores of other
//!   versions, retires the previous version, and claims open clients when
//!   configured to.
//!
//! ### Clients
//! - A client is controlled by the version active when it connected, or by
//!   the version that claimed it. Controlled clients follow each newly
//!   activated version.
//! - Fetches from uncontrolled clients are declined.

mod message;
mod version;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, oneshot};
use waystation_core::{CacheDb, Error};

pub use message::{ControlMessage, ControlReply, Signal, Slot};
pub use version::{AgentVersion, FetchOutcome, VersionId, WorkerState};

use crate::fetch::Network;
use crate::keepalive::KeepAlive;
use crate::queue::{ReplayReport, RetryQueue};
use crate::request::Request;
use crate::strategy::HandlerContext;

pub type ClientId = u64;

#[derive(Debug, Clone)]
struct Installed {
    id: VersionId,
    version: Arc<AgentVersion>,
}

#[derive(Debug, Default)]
struct State {
    next_version: VersionId,
    next_client: ClientId,
    installing: Option<VersionId>,
    waiting: Option<Installed>,
    active: Option<Installed>,
    states: HashMap<VersionId, WorkerState>,
    clients: HashMap<ClientId, Option<VersionId>>,
}

impl State {
    fn slot(&self, slot: Slot) -> Option<&Installed> {
        match slot {
            Slot::Active => self.active.as_ref(),
            Slot::Waiting => self.waiting.as_ref(),
        }
    }

    fn active_has_clients(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| self.clients.values().any(|c| *c == Some(active.id)))
    }

    fn set_state(&mut self, id: VersionId, state: WorkerState) {
        tracing::info!(version_id = id, ?state, "version state changed");
        self.states.insert(id, state);
    }
}

/// Owns the installed versions, the connected clients and the shared
/// handler context.
pub struct Registration {
    ctx: HandlerContext,
    queue: Arc<RetryQueue>,
    state: RwLock<State>,
    transitions: Mutex<()>,
}

impl Registration {
    pub fn new(db: CacheDb, network: Arc<dyn Network>, queue: Arc<RetryQueue>) -> Self {
        Self {
            ctx: HandlerContext { db, network, keep_alive: KeepAlive::new() },
            queue,
            state: RwLock::new(State::default()),
            transitions: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    pub fn keep_alive(&self) -> &KeepAlive {
        &self.ctx.keep_alive
    }

    pub fn queue(&self) -> &Arc<RetryQueue> {
        &self.queue
    }

    /// Install `version`. Returns its id once it is waiting or active.
    ///
    /// # Errors
    ///
    /// `PrecacheAssetUnavailable` (or a storage error) when the precache
    /// could not be completed; the version is then redundant.
    pub async fn install(&self, version: AgentVersion) -> Result<VersionId, Error> {
        let _transition = self.transitions.lock().await;
        let version = Arc::new(version);

        let id = {
            let mut state = self.state.write().await;
            state.next_version += 1;
            let id = state.next_version;
            state.installing = Some(id);
            state.set_state(id, WorkerState::Installing);
            id
        };
        tracing::info!(version_id = id, version = version.version(), "installing");

        let installed = version.precacher().install(&self.ctx.db, self.ctx.network.as_ref()).await;

        {
            let mut state = self.state.write().await;
            state.installing = None;
            if let Err(e) = installed {
                tracing::warn!(version_id = id, error = %e, "install failed");
                state.set_state(id, WorkerState::Redundant);
                return Err(e);
            }

            if let Some(replaced) = state.waiting.take() {
                state.set_state(replaced.id, WorkerState::Redundant);
            }
            state.waiting = Some(Installed { id, version: Arc::clone(&version) });
            state.set_state(id, WorkerState::Waiting);
        }

        let activate_now = {
            let state = self.state.read().await;
            version.skip_waiting() || !state.active_has_clients()
        };
        if activate_now {
            self.activate_waiting().await?;
        }
        Ok(id)
    }

    /// Promote the waiting version. Caller holds the transition lock.
    async fn activate_waiting(&self) -> Result<Option<VersionId>, Error> {
        let next = {
            let mut state = self.state.write().await;
            let next = state.waiting.take();
            if let Some(next) = &next {
                state.set_state(next.id, WorkerState::Activating);
            }
            next
        };
        let Some(next) = next else {
            return Ok(None);
        };

        if let Err(e) = next.version.precacher().activate(&self.ctx.db).await {
            tracing::warn!(version_id = next.id, error = %e, "precache cleanup failed");
        }
        self.delete_outdated_stores(next.version.as_ref()).await;

        let mut state = self.state.write().await;
        if let Some(previous) = state.active.take() {
            state.set_state(previous.id, WorkerState::Redundant);
        }
        for controller in state.clients.values_mut() {
            if controller.is_some() {
                *controller = Some(next.id);
            }
        }
        state.active = Some(next.clone());
        state.set_state(next.id, WorkerState::Active);

        if next.version.clients_claim() {
            claim_all(&mut state, next.id);
        }
        Ok(Some(next.id))
    }

    async fn delete_outdated_stores(&self, version: &AgentVersion) {
        let stores = match self.ctx.db.list_caches().await {
            Ok(stores) => stores,
            Err(e) => {
                tracing::warn!(error = %e, "could not list stores");
                return;
            }
        };
        for store in stores.iter().filter(|s| version.names().is_outdated(s)) {
            match self.ctx.db.delete_cache(store).await {
                Ok(_) => tracing::info!(store = %store, "deleted outdated store"),
                Err(e) => tracing::warn!(store = %store, error = %e, "could not delete outdated store"),
            }
        }
    }

    /// Activate the waiting version without waiting for clients to close.
    pub async fn skip_waiting(&self) -> Result<Option<VersionId>, Error> {
        let _transition = self.transitions.lock().await;
        self.activate_waiting().await
    }

    /// Make the active version control every connected client. Returns the
    /// number of clients that changed controller.
    pub async fn claim(&self) -> Result<usize, Error> {
        let mut state = self.state.write().await;
        let Some(active) = state.active.as_ref().map(|a| a.id) else {
            return Err(Error::InvalidState("no active version to claim clients".into()));
        };
        Ok(claim_all(&mut state, active))
    }

    /// Open a client. It is controlled by the active version, if any.
    pub async fn connect_client(&self) -> ClientId {
        let mut state = self.state.write().await;
        state.next_client += 1;
        let id = state.next_client;
        let controller = state.active.as_ref().map(|a| a.id);
        state.clients.insert(id, controller);
        tracing::debug!(client = id, controller, "client connected");
        id
    }

    /// Close a client. The waiting version activates once the active one
    /// controls no clients.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `client` is not connected.
    pub async fn disconnect_client(&self, client: ClientId) -> Result<(), Error> {
        let _transition = self.transitions.lock().await;
        let ready = {
            let mut state = self.state.write().await;
            if state.clients.remove(&client).is_none() {
                return Err(Error::InvalidInput(format!("unknown client {client}")));
            }
            tracing::debug!(client, "client disconnected");
            state.waiting.is_some() && !state.active_has_clients()
        };
        if ready {
            self.activate_waiting().await?;
        }
        Ok(())
    }

    pub async fn controller_of(&self, client: ClientId) -> Option<VersionId> {
        self.state.read().await.clients.get(&client).copied().flatten()
    }

    pub async fn state_of(&self, version: VersionId) -> Option<WorkerState> {
        self.state.read().await.states.get(&version).copied()
    }

    pub async fn slot_id(&self, slot: Slot) -> Option<VersionId> {
        self.state.read().await.slot(slot).map(|i| i.id)
    }

    pub async fn active_version(&self) -> Option<Arc<AgentVersion>> {
        self.state.read().await.active.as_ref().map(|a| Arc::clone(&a.version))
    }

    /// Fetch event. `client` is `None` for navigations, which the active
    /// version handles.
    pub async fn fetch(&self, client: Option<ClientId>, request: &Request) -> FetchOutcome {
        let version = {
            let state = self.state.read().await;
            let controller = match client {
                Some(client) => state.clients.get(&client).copied().flatten(),
                None => state.active.as_ref().map(|a| a.id),
            };
            match (controller, &state.active) {
                (Some(id), Some(active)) if active.id == id => Some(Arc::clone(&active.version)),
                _ => None,
            }
        };

        match version {
            Some(version) => version.handle_fetch(&self.ctx, request).await,
            None => {
                tracing::debug!(url = %request.url, client, "no controlling version, declined");
                FetchOutcome::Decline
            }
        }
    }

    /// Message event addressed to `slot`.
    pub async fn message(&self, slot: Slot, message: ControlMessage) -> Result<ControlReply, Error> {
        let target = self
            .state
            .read()
            .await
            .slot(slot)
            .cloned()
            .ok_or_else(|| Error::InvalidState(format!("no {slot:?} version")))?;
        tracing::debug!(version_id = target.id, ?message, "control message");

        match message {
            ControlMessage::GetVersion => Ok(ControlReply::Version(target.version.version().to_string())),
            ControlMessage::Ping => Ok(ControlReply::Signal(Signal::Pong)),
            ControlMessage::SkipWaiting => {
                self.skip_waiting().await?;
                Ok(ControlReply::Signal(Signal::Ack))
            }
            ControlMessage::ClientsClaim => {
                if slot != Slot::Active {
                    return Err(Error::InvalidState("only the active version can claim clients".into()));
                }
                self.claim().await?;
                Ok(ControlReply::Signal(Signal::Ack))
            }
        }
    }

    /// Deliver `message` in the background; the reply arrives on the
    /// returned port.
    pub fn post_message(
        self: &Arc<Self>, slot: Slot, message: ControlMessage,
    ) -> oneshot::Receiver<Result<ControlReply, Error>> {
        let (port, reply) = oneshot::channel();
        let registration = Arc::clone(self);
        self.ctx.keep_alive.wait_until("message", async move {
            let result = registration.message(slot, message).await;
            if port.send(result).is_err() {
                tracing::debug!(?message, "reply port closed");
            }
            Ok(())
        });
        reply
    }

    /// Sync event: connectivity is back, replay the retry queue.
    pub async fn sync(&self) -> Result<ReplayReport, Error> {
        self.queue.replay_all(self.ctx.network.as_ref()).await
    }

    /// Periodic expiration sweep of the active version's stores.
    pub async fn sweep(&self) -> Result<u64, Error> {
        match self.active_version().await {
            Some(version) => version.sweep(&self.ctx.db).await,
            None => Ok(0),
        }
    }
}

fn claim_all(state: &mut State, active: VersionId) -> usize {
    let mut claimed = 0;
    for controller in state.clients.values_mut() {
        if *controller != Some(active) {
            *controller = Some(active);
            claimed += 1;
        }
    }
    if claimed > 0 {
        tracing::info!(version_id = active, claimed, "clients claimed");
    }
    claimed
}
