//! Courtside Back binary entrypoint wiring local persistence, remote sync, REST and SSE layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use courtside_back::{
    config::AppConfig,
    dao::{
        gateway::{GatewayError, RemoteSyncGateway, memory::MemoryGateway},
        local_store::FileStore,
    },
    routes,
    services::{match_service, sync_supervisor, sync_worker},
    state::{AppState, SharedState},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const REMOTE_ENV: &str = "COURTSIDE_REMOTE";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = FileStore::open(&config.data_dir)
        .with_context(|| format!("opening data directory {}", config.data_dir.display()))?;
    let app_state = AppState::new(config, Arc::new(store));
    info!(pending = app_state.queue().len(), "offline queue restored");
    match match_service::restore_sessions(&app_state) {
        Ok(matches) => info!(matches, "match sessions restored"),
        Err(err) => warn!(error = %err, "failed to list stored matches"),
    }

    spawn_sync(app_state.clone(), &remote_kind())?;
    tokio::spawn(sync_worker::run(app_state.clone()));

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

/// `--memory` forces the in-memory remote; otherwise [`REMOTE_ENV`] decides.
fn remote_kind() -> String {
    if env::args().any(|arg| arg == "--memory") {
        return "memory".into();
    }
    env::var(REMOTE_ENV)
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_else(|_| "memory".into())
}

/// Start the supervisor that keeps the chosen remote connected.
fn spawn_sync(state: SharedState, remote: &str) -> anyhow::Result<()> {
    match remote {
        "memory" => {
            warn!("using the in-memory remote store; synced data is lost on restart");
            let gateway = MemoryGateway::new();
            tokio::spawn(sync_supervisor::run(state, move || {
                let gateway = gateway.clone();
                async move { Ok::<_, GatewayError>(Arc::new(gateway) as Arc<dyn RemoteSyncGateway>) }
            }));
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            use courtside_back::dao::gateway::couchdb::{CouchConfig, CouchGateway};

            tokio::spawn(sync_supervisor::run(state, || async {
                let config = CouchConfig::from_env()?;
                let gateway = CouchGateway::connect(config).await?;
                Ok::<_, GatewayError>(Arc::new(gateway) as Arc<dyn RemoteSyncGateway>)
            }));
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use courtside_back::dao::gateway::mongodb::{MongoConfig, MongoGateway};

            tokio::spawn(sync_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let gateway = MongoGateway::connect(config).await?;
                Ok::<_, GatewayError>(Arc::new(gateway) as Arc<dyn RemoteSyncGateway>)
            }));
        }
        other => bail!("unsupported {REMOTE_ENV} value `{other}`"),
    }
    info!(remote, "remote sync supervisor started");
    Ok(())
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
