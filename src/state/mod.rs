//! Shared application state handed to every handler.

pub mod registry;
pub mod session_machine;
pub mod storage;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    services::{broadcast::BroadcastDispatcher, session_service::SessionCoordinator},
};

pub use self::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, Membership};
pub use self::storage::{Backend, StorageSlot};

/// State shared by every handler and connection task.
pub type SharedState = Arc<AppState>;

/// Central application state: configuration, storage handle, live connections
/// and the services built on top of them.
pub struct AppState {
    config: Arc<AppConfig>,
    storage: Arc<StorageSlot>,
    registry: Arc<ConnectionRegistry>,
    coordinator: SessionCoordinator,
    dispatcher: BroadcastDispatcher,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::build(config, StorageSlot::new())
    }

    /// Construct an [`AppState`] with a backend installed from the start.
    pub fn with_backend(config: AppConfig, backend: Backend) -> SharedState {
        Self::build(config, StorageSlot::with_backend(backend))
    }

    fn build(config: AppConfig, storage: StorageSlot) -> SharedState {
        let config = Arc::new(config);
        let storage = Arc::new(storage);
        let registry = Arc::new(ConnectionRegistry::new());
        Arc::new(Self {
            coordinator: SessionCoordinator::new(storage.clone(), config.clone()),
            dispatcher: BroadcastDispatcher::new(registry.clone()),
            config,
            storage,
            registry,
        })
    }

    /// Loaded application configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Storage slot, also used by the supervisor to install or drop backends.
    pub fn storage(&self) -> &StorageSlot {
        &self.storage
    }

    /// Registry of live connections per session.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Session business rules.
    pub fn coordinator(&self) -> &SessionCoordinator {
        &self.coordinator
    }

    /// Fan-out to the connections of a session.
    pub fn dispatcher(&self) -> &BroadcastDispatcher {
        &self.dispatcher
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        self.storage.is_degraded()
    }
}
