/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use mildew_api::{app::AppState, config::Config};
/// use mildew_engine::detector::DetectorRegistry;
/// use mildew_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = create_pool(DatabaseConfig::default()).await?;
/// let detectors = DetectorRegistry::from_settings(&config.detection.detector_settings())?;
/// let state = AppState::new(pool, config, detectors);
/// let app = mildew_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::{
        client_ip::client_ip_layer,
        rate_limit::{rate_limit_layer, RateLimit, RateLimiter},
        security::SecurityHeadersLayer,
    },
    routes,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use mildew_engine::detector::DetectorRegistry;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,

    /// Application configuration
    pub config: Arc<Config>,

    /// One detector per detection kind
    pub detectors: Arc<DetectorRegistry>,

    /// Bounds concurrent inferences to `INFERENCE_CONCURRENCY`
    pub inference: Arc<Semaphore>,

    /// None when rate limiting is off
    pub rate_limiter: Option<Arc<RateLimiter>>,
}

impl AppState {
    /// Creates new application state
    pub fn new(db: SqlitePool, config: Config, detectors: DetectorRegistry) -> Self {
        let rate_limiter = match config.rate_limit.per_minute {
            0 => None,
            n => Some(Arc::new(RateLimiter::new(RateLimit::per_minute(n)))),
        };

        Self {
            db,
            inference: Arc::new(Semaphore::new(config.detection.concurrency.max(1))),
            config: Arc::new(config),
            detectors: Arc::new(detectors),
            rate_limiter,
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET  /ping
/// ├── GET  /health
/// ├── /user/
/// │   ├── POST /register
/// │   ├── POST /login
/// │   └── GET|PUT /me            (bearer)
/// ├── /calc/                      (rate limited, upload size capped)
/// │   ├── POST /downy             (bearer or ?user_id=)
/// │   ├── POST /powdery           (optional bearer)
/// │   └── POST /frogeye           (optional bearer)
/// ├── /records                    (bearer)
/// │   ├── GET    /
/// │   ├── GET    /:id
/// │   └── DELETE /:id
/// └── /static/*                   (saved result images)
/// ```
///
/// # Middleware Stack
///
/// Outermost first:
/// 1. Security headers
/// 2. CORS
/// 3. Logging (tower-http TraceLayer)
/// 4. Client address resolution
/// 5. Rate limiting and body limit (`/calc` only)
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/ping", get(routes::health::ping))
        .route("/health", get(routes::health::health_check));

    let user_routes = Router::new()
        .route("/register", post(routes::user::register))
        .route("/login", post(routes::user::login))
        .route("/me", get(routes::user::me).put(routes::user::update_me));

    let calc_routes = Router::new()
        .route("/downy", post(routes::calc::downy))
        .route("/powdery", post(routes::calc::powdery))
        .route("/frogeye", post(routes::calc::frogeye))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.detection.max_upload_bytes))
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_layer));

    let record_routes = Router::new()
        .route("/", get(routes::records::list_records))
        .route(
            "/:id",
            get(routes::records::get_record).delete(routes::records::delete_record),
        );

    let cors = if state.config.cors_allows_any() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/user", user_routes)
        .nest("/calc", calc_routes)
        .nest("/records", record_routes)
        .nest_service("/static", ServeDir::new(&state.config.storage.static_dir))
        .layer(axum::middleware::from_fn_with_state(state.clone(), client_ip_layer))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}
