//! Chatmeter Service - usage metering, ledger and quotas for the chat API
//!
//! This is the main entry point for the chatmeter service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatmeter_service::{create_router, AppState, ServiceConfig};
use chatmeter_store::{MemoryStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chatmeter=debug,chatmeter_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Chatmeter Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        auth_configured = %config.auth_jwt_secret.is_some(),
        admin_key_configured = %config.admin_api_key.is_some(),
        identity_configured = %config.identity_url.is_some(),
        inference_configured = %config.inference_url.is_some(),
        unknown_model_policy = ?config.pricing.unknown_model_policy,
        "Service configuration loaded"
    );

    if config.auth_jwt_secret.is_none() {
        tracing::warn!("AUTH_JWT_SECRET not set - all authenticated routes will reject requests");
    }

    let store = open_store(&config)?;

    // Build app state
    let state = AppState::new(store, config.clone())?;

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Open the configured store backend.
fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    if config.uses_memory_store() {
        tracing::warn!("Using in-memory store - data will not survive a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    #[cfg(feature = "rocksdb-backend")]
    {
        tracing::info!(path = %config.data_dir, "Opening RocksDB store");
        Ok(Arc::new(chatmeter_store::RocksStore::open(&config.data_dir)?))
    }

    #[cfg(not(feature = "rocksdb-backend"))]
    {
        Err(format!(
            "DATA_DIR={} requires the rocksdb-backend feature; use {} for the in-memory store",
            config.data_dir,
            chatmeter_service::config::IN_MEMORY_DATA_DIR
        )
        .into())
    }
}
