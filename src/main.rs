//! Quiz live backend entrypoint wiring REST, WebSocket and storage layers.

use std::{env, fs, net::SocketAddr, path::Path, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_live_back::{
    config::AppConfig,
    dao::game_store::memory::{CatalogSeed, MemoryGameStore, MemoryQuizCatalog},
    routes,
    state::{AppState, Backend, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let mongo_uri = env::var("MONGO_URI")
        .ok()
        .filter(|uri| !uri.trim().is_empty());

    let app_state = match mongo_uri {
        Some(_) => mongo_state(config)?,
        None => memory_state(config)?,
    };

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

/// In-process storage with the quiz catalog loaded from the configured seed file.
fn memory_state(config: AppConfig) -> anyhow::Result<SharedState> {
    let catalog = match config.catalog_seed_path.as_deref() {
        Some(path) => load_catalog(path)?,
        None => {
            warn!("no catalog seed configured; quiz catalog is empty");
            MemoryQuizCatalog::new()
        }
    };
    info!(quizzes = catalog.quiz_count(), "using in-memory storage");
    let backend = Backend::new(Arc::new(MemoryGameStore::new()), Arc::new(catalog));
    Ok(AppState::with_backend(config, backend))
}

fn load_catalog(path: &Path) -> anyhow::Result<MemoryQuizCatalog> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading catalog seed {}", path.display()))?;
    let seed: CatalogSeed = serde_json::from_str(&contents)
        .with_context(|| format!("parsing catalog seed {}", path.display()))?;
    Ok(MemoryQuizCatalog::from_seed(seed))
}

/// Start degraded and let the supervisor install the MongoDB backend once reachable.
#[cfg(feature = "mongo-store")]
fn mongo_state(config: AppConfig) -> anyhow::Result<SharedState> {
    use quiz_live_back::{
        dao::{
            game_store::mongodb::{MongoConfig, MongoGameStore},
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    let state = AppState::new(config);
    tokio::spawn(storage_supervisor::run(state.clone(), || async {
        let config = MongoConfig::from_env().await?;
        let store = MongoGameStore::connect(config).await?;
        let catalog = store.catalog();
        Ok::<_, StorageError>(Backend::new(Arc::new(store), Arc::new(catalog)))
    }));
    Ok(state)
}

#[cfg(not(feature = "mongo-store"))]
fn mongo_state(config: AppConfig) -> anyhow::Result<SharedState> {
    warn!("MONGO_URI is set but MongoDB support is not compiled in; using in-memory storage");
    memory_state(config)
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

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
