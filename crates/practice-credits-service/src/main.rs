//! Practice credits service entry point.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use practice_credits_core::BillingError;
use practice_credits_service::{create_router, AppState, ServiceConfig, StorageBackend};
use practice_credits_store::{MemoryStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,practice_credits=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting practice credits service");

    let config = ServiceConfig::from_env()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        backend = ?config.storage_backend,
        data_dir = %config.data_dir,
        service_key_configured = config.service_api_key.is_some(),
        "Service configuration loaded"
    );
    if config.service_api_key.is_none() {
        tracing::warn!("SERVICE_API_KEY is not set; every /v1 request will be rejected");
    }

    let store = open_store(&config)?;
    let state = AppState::new(store, config.clone());
    state.seed_catalog(&config.load_catalog()?)?;

    let app = create_router(state);

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, BillingError> {
    match config.storage_backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "rocksdb-backend")]
        StorageBackend::RocksDb => {
            tracing::info!(path = %config.data_dir, "Opening RocksDB store");
            Ok(Arc::new(practice_credits_store::RocksStore::open(
                &config.data_dir,
            )?))
        }
        #[cfg(not(feature = "rocksdb-backend"))]
        StorageBackend::RocksDb => Err(BillingError::Configuration(
            "built without the rocksdb-backend feature".into(),
        )),
    }
}
