//! # Mildew API Server
//!
//! HTTP server for soybean downy mildew, powdery mildew and frogeye leaf
//! spot detection.
//!
//! ## Architecture
//!
//! The API server is built with Axum and provides:
//! - Detection endpoints (`/calc/downy`, `/calc/powdery`, `/calc/frogeye`)
//! - Accounts with bcrypt/Argon2 passwords and JWT bearer tokens
//! - Per-user history of detection results
//! - Static serving of saved result images
//!
//! ## Usage
//!
//! ```bash
//! JWT_SECRET_KEY=$(openssl rand -hex 32) cargo run -p mildew-api
//! ```

use mildew_api::{
    app::{build_router, AppState},
    config::Config,
};
use mildew_engine::detector::DetectorRegistry;
use mildew_shared::db::{
    migrations::run_migrations,
    pool::{close_pool, create_pool, DatabaseConfig},
};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("Mildew API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..DatabaseConfig::default()
    })
    .await?;
    run_migrations(&pool).await?;

    let detectors = DetectorRegistry::from_settings(&config.detection.detector_settings())?;
    tracing::info!(
        backend = %config.detection.backend,
        detectors = detectors.len(),
        concurrency = config.detection.concurrency,
        "Detectors ready"
    );

    tokio::fs::create_dir_all(&config.storage.static_dir).await?;
    tokio::fs::create_dir_all(&config.storage.image_cache_dir).await?;

    let bind_address = config.bind_address();
    let state = AppState::new(pool.clone(), config, detectors);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    close_pool(pool).await;
    tracing::info!("Server stopped");

    Ok(())
}

/// `RUST_LOG` sets the filter; `LOG_FORMAT=json` switches to JSON lines
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mildew_api=debug,mildew_engine=info,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
