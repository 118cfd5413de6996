use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smart_home_backend::{
    build_router,
    clock::LocalClock,
    config::{Config, StorageBackend},
    remote::RemoteClient,
    storage::{KeyValueStore, MemoryStore, SqliteStore},
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smart_home_backend=debug,server=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("=== Smart Home backend starting ===");

    let config = Config::from_env();

    // Durable storage
    let storage: Arc<dyn KeyValueStore> = match config.storage {
        StorageBackend::Sqlite => Arc::new(SqliteStore::connect(&config.database_url).await?),
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };
    tracing::info!("Storage ready");

    // External auth / settings service
    let remote = RemoteClient::new(&config.auth_service_url, config.remote_timeout)?;
    tracing::info!("Auth service: {}", remote.base_url());

    let state = AppState::load(storage, Arc::new(LocalClock), remote).await;

    // Build router
    let app = build_router(state, &config.static_dir);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Dashboard: http://localhost:{}", config.port);

    axum::serve(listener, app).await?;
    Ok(())
}
