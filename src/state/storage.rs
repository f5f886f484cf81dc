//! Swappable storage backend with degraded-mode tracking.

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    dao::game_store::{GameStore, QuizCatalog},
    error::ServiceError,
};

/// Storage collaborators used by the coordinator.
#[derive(Clone)]
pub struct Backend {
    /// Session, player and answer storage.
    pub store: Arc<dyn GameStore>,
    /// Quiz, question and choice lookups.
    pub catalog: Arc<dyn QuizCatalog>,
}

impl Backend {
    /// Pair a store with a catalog.
    pub fn new(store: Arc<dyn GameStore>, catalog: Arc<dyn QuizCatalog>) -> Self {
        Self { store, catalog }
    }
}

/// Installed storage backend plus the degraded flag watchers can follow.
pub struct StorageSlot {
    backend: RwLock<Option<Backend>>,
    degraded: watch::Sender<bool>,
}

impl StorageSlot {
    /// Empty slot; starts in degraded mode until [`StorageSlot::install`] is called.
    pub fn new() -> Self {
        let (degraded, _rx) = watch::channel(true);
        Self {
            backend: RwLock::new(None),
            degraded,
        }
    }

    /// Slot holding `backend`, not degraded.
    pub fn with_backend(backend: Backend) -> Self {
        let (degraded, _rx) = watch::channel(false);
        Self {
            backend: RwLock::new(Some(backend)),
            degraded,
        }
    }

    /// Current backend, or [`ServiceError::Degraded`] when none is usable.
    pub async fn require(&self) -> Result<Backend, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.backend
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or(ServiceError::Degraded)
    }

    /// Install a new backend and leave degraded mode.
    pub async fn install(&self, backend: Backend) {
        {
            let mut guard = self.backend.write().await;
            *guard = Some(backend);
        }
        self.update_degraded(false);
    }

    /// Drop the current backend and enter degraded mode.
    pub async fn clear(&self) {
        {
            let mut guard = self.backend.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Whether operations currently fail with [`ServiceError::Degraded`].
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update the degraded flag, notifying watchers only on change.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Receiver following the degraded flag.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }
}

impl Default for StorageSlot {
    fn default() -> Self {
        Self::new()
    }
}
