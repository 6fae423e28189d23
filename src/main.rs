//! Tabletop relay binary entrypoint wiring the WebSocket relay, HTTP routes and the record store.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tabletop_relay::{
    config::{AppConfig, StoreBackend},
    dao::{
        record_store::{RecordStore, memory::MemoryRecordStore},
        storage::StorageError,
    },
    routes,
    services::storage_supervisor,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let port = config.port;
    let app_state = AppState::new(config);

    spawn_storage(&app_state);
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the supervisor for the configured backend, if any.
fn spawn_storage(state: &SharedState) {
    let config = state.config().clone();
    match config.store_backend {
        StoreBackend::None => {
            info!("no record store configured; the board lives in memory only");
            state.set_degraded(false);
        }
        StoreBackend::Memory => {
            let store = MemoryRecordStore::new();
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let store = store.clone();
                async move { Ok::<_, StorageError>(Arc::new(store) as Arc<dyn RecordStore>) }
            }));
        }
        StoreBackend::Mongo => spawn_mongo(state, &config),
        StoreBackend::Couch => spawn_couch(state, &config),
    }
}

#[cfg(feature = "mongo-store")]
fn spawn_mongo(state: &SharedState, config: &AppConfig) {
    use tabletop_relay::dao::record_store::mongodb::{MongoConfig, MongoRecordStore};

    let uri = config.mongo_uri.clone();
    let db_name = config.mongo_db.clone();

    tokio::spawn(storage_supervisor::run(state.clone(), move || {
        let uri = uri.clone();
        let db_name = db_name.clone();
        async move {
            let mongo_config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
            let store = MongoRecordStore::connect(mongo_config).await?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn RecordStore>)
        }
    }));
}

#[cfg(not(feature = "mongo-store"))]
fn spawn_mongo(_state: &SharedState, _config: &AppConfig) {
    warn!("built without the mongo-store feature; running without a record store");
}

#[cfg(feature = "couch-store")]
fn spawn_couch(state: &SharedState, config: &AppConfig) {
    use tabletop_relay::dao::record_store::couchdb::{CouchConfig, CouchRecordStore};

    let couch_config = CouchConfig::new(config.couch_base_url.clone(), config.couch_db.clone())
        .with_credentials(config.couch_username.clone(), config.couch_password.clone());

    tokio::spawn(storage_supervisor::run(state.clone(), move || {
        let couch_config = couch_config.clone();
        async move {
            let store = CouchRecordStore::connect(couch_config).await?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn RecordStore>)
        }
    }));
}

#[cfg(not(feature = "couch-store"))]
fn spawn_couch(_state: &SharedState, _config: &AppConfig) {
    warn!("built without the couch-store feature; running without a record store");
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
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
