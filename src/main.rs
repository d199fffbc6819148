use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod keys;
mod models;
mod routes;
mod services;
mod state;
mod store;

use config::{AppConfig, StoreBackend};
use store::{
    ObjectStore,
    local::LocalStore,
    memory::MemoryStore,
    s3::{S3Settings, S3Store},
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;

    tracing::info!("Starting profile-store with config: {:?}", cfg);

    // --- Initialize the object store once; every request shares it ---
    let store = build_store(&cfg).await?;
    tracing::info!("Using {} object store backend", store.backend());

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes)
        .with_state(state::AppState::new(store))
        .layer(TimeoutLayer::new(cfg.request_timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Construct the configured backend.
async fn build_store(cfg: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match cfg.backend {
        StoreBackend::S3 => {
            let settings = S3Settings {
                region: cfg.region.clone(),
                bucket: cfg.bucket.clone(),
                max_attempts: cfg.max_retries,
                endpoint_url: cfg.endpoint_url.clone(),
                signed_urls: cfg.signed_urls,
            };
            Arc::new(S3Store::connect(&settings).await)
        }
        StoreBackend::Local => {
            let store = LocalStore::open(&cfg.data_dir).await?;
            tracing::info!("Storing objects under {}", store.base_path.display());
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("Memory backend selected; data is lost on exit");
            Arc::new(MemoryStore::new(cfg.signed_urls))
        }
    };
    Ok(store)
}
