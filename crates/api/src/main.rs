//! SupportDesk API server

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use supportdesk_api::{
    auth::JwtManager,
    config::BroadcastBackend,
    routes::create_router,
    store::{postgres::create_pool, PgStore, RecordStore},
    websocket::{BroadcastBus, LocalBus, RedisBus},
    AppState, Config,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("supportdesk_api=info,tower_http=info"));

    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    let pg = PgStore::new(pool);
    pg.migrate().await.context("Failed to run migrations")?;
    let store: Arc<dyn RecordStore> = Arc::new(pg);

    let bus: Arc<dyn BroadcastBus> = match config.broadcast_backend {
        BroadcastBackend::Memory => Arc::new(LocalBus::new()),
        BroadcastBackend::Redis => Arc::new(
            RedisBus::connect(&config.redis_url)
                .await
                .context("Failed to connect to Redis")?,
        ),
    };
    tracing::info!(backend = ?config.broadcast_backend, "Broadcast bus ready");

    let jwt = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
    let state = AppState::new(store, bus, jwt);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    tracing::info!(address = %config.bind_address, "SupportDesk API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
