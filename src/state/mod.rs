/// Board entities, drafts and patches.
pub mod board;
/// Authoritative board collections.
pub mod repository;
/// Per-connection role state.
pub mod session;
/// Registry of live sessions.
pub mod sessions;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, watch};

use crate::{
    config::AppConfig,
    dao::record_store::RecordStore,
    services::persistence::{PersistOp, PersistenceQueue, StoreSlot},
};

use self::{repository::Repository, sessions::SessionRegistry};

pub type SharedState = Arc<AppState>;

/// Central application state: the board, the live sessions and the storage handle.
pub struct AppState {
    config: AppConfig,
    repository: Mutex<Repository>,
    sessions: SessionRegistry,
    record_store: StoreSlot,
    persistence: PersistenceQueue,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// Spawns the persistence worker, so a tokio runtime must be running.
    /// The application starts in degraded mode until a record store is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let record_store: StoreSlot = Arc::new(RwLock::new(None));
        Arc::new(Self {
            config,
            repository: Mutex::new(Repository::new()),
            sessions: SessionRegistry::new(),
            persistence: PersistenceQueue::spawn(record_store.clone()),
            record_store,
            degraded: degraded_tx,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Canonical board. Hold the guard across mutation and broadcast.
    pub fn repository(&self) -> &Mutex<Repository> {
        &self.repository
    }

    /// Registry of connected sessions.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Obtain a handle to the current record store, if one is installed.
    pub async fn record_store(&self) -> Option<Arc<dyn RecordStore>> {
        self.record_store.read().await.clone()
    }

    /// Install a record store and leave degraded mode.
    pub async fn install_record_store(&self, store: Arc<dyn RecordStore>) {
        *self.record_store.write().await = Some(store);
        self.set_degraded(false);
    }

    /// Remove the current record store and enter degraded mode.
    pub async fn clear_record_store(&self) {
        self.record_store.write().await.take();
        self.set_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update the degraded flag, notifying watchers only on change.
    pub fn set_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }

    /// Mirror a mutation into the record store without waiting for it.
    pub fn persist(&self, op: PersistOp) {
        self.persistence.push(op);
    }

    /// Wait for every write queued so far to be attempted.
    pub async fn flush_persistence(&self) {
        self.persistence.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::record_store::memory::MemoryRecordStore;

    #[tokio::test]
    async fn degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());

        state
            .install_record_store(Arc::new(MemoryRecordStore::new()))
            .await;
        assert!(!state.is_degraded());
        assert!(watcher.has_changed().unwrap());
        watcher.borrow_and_update();

        state.clear_record_store().await;
        assert!(state.is_degraded());
        assert!(state.record_store().await.is_none());
        assert!(watcher.has_changed().unwrap());
    }
}
