//! Word derby binary entrypoint wiring the WebSocket and REST layers, the task
//! queue and the storage supervisor.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use word_derby_back::{
    config::AppConfig,
    dao::{
        game_store::{GameStore, memory::MemoryGameStore},
        storage::StorageError,
        words::WordDictionary,
    },
    routes,
    services::{dispatcher::TokioDispatcher, storage_supervisor},
    state::{AppState, SharedState, TaskRunner},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(AppConfig::load());
    let dictionary = Arc::new(WordDictionary::load(&config.words_path));
    let backend = StorageBackend::from_env()?;

    let (dispatcher, queue) = TokioDispatcher::new();
    let app_state = AppState::new(config, dictionary, Arc::new(dispatcher), backend.name());

    tokio::spawn(queue.run(Arc::new(TaskRunner(app_state.clone()))));
    spawn_storage_supervisor(app_state.clone(), backend);

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Storage backend selected through `STORAGE_BACKEND`.
#[derive(Debug, Clone, Copy)]
enum StorageBackend {
    Memory,
    #[cfg(feature = "couch-store")]
    Couch,
    #[cfg(feature = "mongo-store")]
    Mongo,
}

impl StorageBackend {
    fn from_env() -> anyhow::Result<Self> {
        let name = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "memory".into());
        Ok(match name.trim().to_ascii_lowercase().as_str() {
            "" | "memory" => Self::Memory,
            #[cfg(feature = "couch-store")]
            "couch" | "couchdb" => Self::Couch,
            #[cfg(feature = "mongo-store")]
            "mongo" | "mongodb" => Self::Mongo,
            other => bail!("unsupported STORAGE_BACKEND `{other}`"),
        })
    }

    fn name(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            #[cfg(feature = "couch-store")]
            Self::Couch => "couch",
            #[cfg(feature = "mongo-store")]
            Self::Mongo => "mongo",
        }
    }
}

/// Spawn the supervisor that connects the selected backend and toggles degraded mode.
fn spawn_storage_supervisor(state: SharedState, backend: StorageBackend) {
    match backend {
        StorageBackend::Memory => {
            // A single store for the whole process; reconnecting must not drop its records.
            let store: Arc<dyn GameStore> = Arc::new(MemoryGameStore::new());
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move { Ok::<_, StorageError>(store) }
            }));
        }
        #[cfg(feature = "couch-store")]
        StorageBackend::Couch => {
            use word_derby_back::dao::game_store::couchdb::{CouchConfig, CouchGameStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchGameStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn GameStore>)
            }));
        }
        #[cfg(feature = "mongo-store")]
        StorageBackend::Mongo => {
            use word_derby_back::dao::game_store::mongodb::{MongoConfig, MongoGameStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoGameStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn GameStore>)
            }));
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
