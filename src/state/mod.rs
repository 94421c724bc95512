pub mod engine;
pub mod registry;

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::Mutex;

use crate::{
    config::AppConfig,
    dao::event_store::EventRecord,
    services::{event_log::EventLogger, router::ProtocolTable},
};

use self::{engine::GameEngine, registry::ConnectionRegistry};

pub type SharedState = Arc<AppState>;

/// Central application state shared by every connection task and the tick scheduler.
pub struct AppState {
    config: Arc<AppConfig>,
    registry: ConnectionRegistry,
    engine: Mutex<GameEngine>,
    // Bumped under the engine lock on every match start or stop.
    match_epoch: AtomicU64,
    protocol: ProtocolTable,
    events: EventLogger,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig, events: EventLogger) -> SharedState {
        let protocol = ProtocolTable::from_names(&config.routes);
        Arc::new(Self {
            registry: ConnectionRegistry::new(config.max_connections),
            engine: Mutex::new(GameEngine::new()),
            match_epoch: AtomicU64::new(0),
            protocol,
            events,
            config: Arc::new(config),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    /// Registry of admitted connections.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// The single authoritative simulation.
    pub fn engine(&self) -> &Mutex<GameEngine> {
        &self.engine
    }

    /// Message types accepted by the router.
    pub fn protocol(&self) -> &ProtocolTable {
        &self.protocol
    }

    /// Queue an audit event; never fails.
    pub fn log_event(&self, event: EventRecord) {
        self.events.log(event);
    }

    /// Identifier of the current match attempt.
    pub fn match_epoch(&self) -> u64 {
        self.match_epoch.load(Ordering::Acquire)
    }

    /// Supersede any pending countdown or running scheduler, returning the new epoch.
    ///
    /// Callers hold the engine lock so epoch checks and engine transitions stay consistent.
    pub(crate) fn advance_epoch(&self, _engine: &GameEngine) -> u64 {
        self.match_epoch.fetch_add(1, Ordering::AcqRel) + 1
    }
}
