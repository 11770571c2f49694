pub mod connections;
pub mod game;
pub mod state_machine;

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::{game_store::GameStore, words::WordDictionary},
    error::ServiceError,
    services::{
        dispatcher::{Task, TaskDispatcher, TaskHandler},
        game_service::GameService,
        notifier::Notifier,
    },
};

use self::connections::ConnectionRegistry;

pub type SharedState = Arc<AppState>;

/// Central application state: live connections, collaborators of the game
/// service and the storage backend once one is reachable.
pub struct AppState {
    config: Arc<AppConfig>,
    dictionary: Arc<WordDictionary>,
    connections: Arc<ConnectionRegistry>,
    dispatcher: Arc<dyn TaskDispatcher>,
    service: RwLock<Option<Arc<GameService>>>,
    degraded: watch::Sender<bool>,
    storage_backend: &'static str,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(
        config: Arc<AppConfig>,
        dictionary: Arc<WordDictionary>,
        dispatcher: Arc<dyn TaskDispatcher>,
        storage_backend: &'static str,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            dictionary,
            connections: Arc::new(ConnectionRegistry::new()),
            dispatcher,
            service: RwLock::new(None),
            degraded: degraded_tx,
            storage_backend,
        })
    }

    /// Install a storage backend, rebuild the game service on top of it and leave degraded mode.
    pub async fn set_game_store(&self, store: Arc<dyn GameStore>) {
        let notifier = Notifier::new(
            self.connections.clone(),
            self.config.broadcast_concurrency,
        );
        let service = GameService::new(
            store,
            notifier,
            self.dispatcher.clone(),
            self.dictionary.clone(),
            self.config.clone(),
        );
        {
            let mut guard = self.service.write().await;
            *guard = Some(Arc::new(service));
        }
        self.update_degraded(false).await;
    }

    /// Game service, unless storage is unreachable.
    pub async fn game_service(&self) -> Result<Arc<GameService>, ServiceError> {
        if self.is_degraded().await {
            return Err(ServiceError::Degraded);
        }
        let guard = self.service.read().await;
        guard.as_ref().cloned().ok_or(ServiceError::Degraded)
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.service.read().await;
        guard.as_ref().map(|service| service.store().clone())
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Registry of open player sockets keyed by connection identity.
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Name of the configured storage backend.
    pub fn storage_backend(&self) -> &'static str {
        self.storage_backend
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Routes due continuations to whichever game service is installed.
pub struct TaskRunner(pub SharedState);

impl TaskHandler for TaskRunner {
    fn handle(&self, task: Task) -> BoxFuture<'static, Result<(), ServiceError>> {
        let state = self.0.clone();
        Box::pin(async move { state.game_service().await?.handle_task(task).await })
    }
}
