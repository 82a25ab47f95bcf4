//! Z-Margin Service - HTTP API for usage-vs-revenue profitability
//!
//! This is the main entry point for the z-margin service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use z_margin_service::{create_router, scheduler, AppState, ServiceConfig};
use z_margin_store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,z_margin=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Z-Margin Service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        service_key_configured = %config.service_api_key.is_some(),
        scheduler_enabled = %config.enable_scheduler,
        "Service configuration loaded"
    );

    let store = open_store(&config)?;
    let state = AppState::new(store, config.clone());

    let scheduler = config
        .enable_scheduler
        .then(|| scheduler::spawn(Arc::clone(&state.engine), &config));

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    if let Some(scheduler) = scheduler {
        scheduler.abort();
    }
    Ok(())
}

#[cfg(feature = "rocksdb-backend")]
fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    Ok(Arc::new(z_margin_store::RocksStore::open(&config.data_dir)?))
}

#[cfg(not(feature = "rocksdb-backend"))]
fn open_store(_config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::warn!("RocksDB backend not compiled in - using in-memory store");
    Ok(Arc::new(z_margin_store::MemoryStore::new()))
}
