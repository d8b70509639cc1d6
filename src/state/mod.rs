pub mod match_state;
mod sse;
pub mod state_machine;
pub mod statistics;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        gateway::RemoteSyncGateway, local_store::LocalStore, snapshot_store::LocalSnapshotStore,
    },
    services::{
        connectivity::ConnectivityOracle, offline_queue::OfflineOperationQueue,
        scoreboard::ScoreboardController,
    },
};

pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

const SSE_CAPACITY: usize = 32;

/// Match controllers are serialized per match behind an async mutex.
pub type SessionHandle = Arc<Mutex<ScoreboardController>>;

/// Central application state: local persistence, sync machinery and live match sessions.
pub struct AppState {
    config: AppConfig,
    snapshots: LocalSnapshotStore,
    queue: Arc<OfflineOperationQueue>,
    oracle: Arc<ConnectivityOracle>,
    sessions: DashMap<Uuid, SessionHandle>,
    sse: SseHub,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts offline until the sync supervisor installs a gateway and its first
    /// health check succeeds. The persisted queue is reloaded from `store`.
    pub fn new(config: AppConfig, store: Arc<dyn LocalStore>) -> SharedState {
        let oracle = Arc::new(ConnectivityOracle::new(false));
        let queue =
            OfflineOperationQueue::load(store.clone(), oracle.clone(), config.queue_options());
        Arc::new(Self {
            config,
            snapshots: LocalSnapshotStore::new(store),
            queue: Arc::new(queue),
            oracle,
            sessions: DashMap::new(),
            sse: SseHub::new(SSE_CAPACITY),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn snapshots(&self) -> &LocalSnapshotStore {
        &self.snapshots
    }

    pub fn queue(&self) -> &Arc<OfflineOperationQueue> {
        &self.queue
    }

    pub fn oracle(&self) -> &ConnectivityOracle {
        &self.oracle
    }

    /// Live controllers keyed by match id.
    pub fn sessions(&self) -> &DashMap<Uuid, SessionHandle> {
        &self.sessions
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        &self.sse
    }

    /// Hand a connected gateway to the offline queue.
    pub async fn install_gateway(&self, gateway: Arc<dyn RemoteSyncGateway>) {
        self.queue.install_gateway(gateway).await;
    }

    /// Drop the gateway and go offline.
    pub async fn clear_gateway(&self) {
        self.queue.clear_gateway().await;
        self.oracle.set_online(false);
    }

    /// Degraded means remote sync is currently impossible; scoring keeps working.
    pub fn is_degraded(&self) -> bool {
        !self.oracle.is_online()
    }
}
