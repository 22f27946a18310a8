//! Common test utilities for integration tests
//!
//! This module provides shared infrastructure for integration tests:
//! - In-memory database with migrations applied
//! - Mock detectors over a scratch data directory
//! - A registered test user and bearer token
//! - Request builders for JSON and multipart uploads

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use image::{ImageFormat, Rgb, RgbImage};
use mildew_api::app::{build_router, AppState};
use mildew_api::config::{
    ApiConfig, Config, DatabaseConfig, DetectionConfig, JwtConfig, RateLimitConfig, StorageConfig,
};
use mildew_engine::detector::{Detector, DetectorRegistry};
use mildew_shared::auth::jwt::{create_token, Claims};
use mildew_shared::auth::password::{hash_password, PasswordScheme};
use mildew_shared::db::{
    migrations::run_migrations,
    pool::{self, create_pool},
};
use mildew_shared::models::user::{CreateUser, User};
use mildew_shared::models::DetectionKind;
use serde_json::Value as JsonValue;
use sqlx::SqlitePool;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const SECRET: &str = "integration-secret-key-at-least-32-bytes";
pub const PASSWORD: &str = "soybean-leaf";
pub const BOUNDARY: &str = "mildew-test-boundary";

/// Cheap bcrypt cost so tests stay fast
pub const TEST_SCHEME: PasswordScheme = PasswordScheme::Bcrypt { cost: 4 };

/// Test context containing all necessary resources
pub struct TestContext {
    pub db: SqlitePool,
    pub app: Router,
    pub config: Config,
    pub user: User,
    pub jwt_token: String,
    scratch: TempDir,
}

/// Knobs for [`TestContext::with_options`]
#[derive(Clone)]
pub struct Options {
    pub rate_limit_per_minute: u32,
    pub max_upload_bytes: usize,
    pub allow_legacy_user_id: bool,
    pub inference_timeout: Duration,

    /// Replace the mock detector for one kind
    pub detectors: Vec<(DetectionKind, Arc<dyn Detector>)>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 0,
            max_upload_bytes: 2 * 1024 * 1024,
            allow_legacy_user_id: false,
            inference_timeout: Duration::from_secs(30),
            detectors: Vec::new(),
        }
    }
}

impl TestContext {
    /// Creates a context with rate limiting off
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_options(Options::default()).await
    }

    pub async fn with_options(options: Options) -> anyhow::Result<Self> {
        let scratch = tempfile::tempdir()?;

        let config = Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                trust_proxy_headers: true,
                cors_origins: vec!["*".to_string()],
                production: false,
                allow_legacy_user_id: options.allow_legacy_user_id,
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
            jwt: JwtConfig {
                secret: SECRET.to_string(),
                expire_hours: 24.0,
                password_scheme: TEST_SCHEME,
            },
            detection: DetectionConfig {
                mock_data_dir: scratch.path().join("mock_data"),
                max_upload_bytes: options.max_upload_bytes,
                timeout: options.inference_timeout,
                ..DetectionConfig::default()
            },
            storage: StorageConfig {
                image_cache_dir: scratch.path().join("image_cache"),
                static_dir: scratch.path().join("static"),
            },
            rate_limit: RateLimitConfig {
                per_minute: options.rate_limit_per_minute,
            },
        };
        std::fs::create_dir_all(&config.detection.mock_data_dir)?;

        let db = create_pool(pool::DatabaseConfig::in_memory()).await?;
        run_migrations(&db).await?;

        let user = User::create(
            &db,
            CreateUser {
                username: "grower".to_string(),
                password_hash: hash_password(PASSWORD, TEST_SCHEME)?,
                nickname: "Grower".to_string(),
            },
        )
        .await?;

        let claims = Claims::new(user.id, user.nickname.clone(), 1.0)?;
        let jwt_token = create_token(&claims, SECRET)?;

        let mut detectors = DetectorRegistry::from_settings(&config.detection.detector_settings())?;
        for (kind, detector) in options.detectors {
            detectors = detectors.with(kind, detector);
        }
        let state = AppState::new(db.clone(), config.clone(), detectors);
        let app = build_router(state);

        Ok(TestContext {
            db,
            app,
            config,
            user,
            jwt_token,
            scratch,
        })
    }

    /// Returns authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.jwt_token)
    }

    /// Header carrying a correctly signed token that expired an hour ago
    pub fn expired_auth_header(&self) -> String {
        let claims = Claims::with_expiration(
            self.user.id,
            self.user.nickname.clone(),
            chrono::Duration::seconds(-3600),
        )
        .unwrap();
        format!("Bearer {}", create_token(&claims, SECRET).unwrap())
    }

    /// Header carrying the valid token with its signature altered
    pub fn tampered_auth_header(&self) -> String {
        let (unsigned, signature) = self.jwt_token.rsplit_once('.').unwrap();
        let flipped: String = signature.chars().rev().collect();
        format!("Bearer {}.{}", unsigned, flipped)
    }

    pub fn mock_data_dir(&self) -> PathBuf {
        self.config.detection.mock_data_dir.clone()
    }

    pub fn static_dir(&self) -> PathBuf {
        self.config.storage.static_dir.clone()
    }

    pub fn scratch(&self) -> &std::path::Path {
        self.scratch.path()
    }

    /// Sends a request and decodes the JSON body (Null when empty)
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, JsonValue) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let body = if bytes.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }
}

/// PNG of a flat green field with a darker patch
pub fn leaf_png(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let mut img = RgbImage::from_pixel(width, height, Rgb([40, 160, seed]));
    for y in height / 3..height / 2 {
        for x in width / 3..width / 2 {
            img.put_pixel(x, y, Rgb([90, 70, 30]));
        }
    }

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Multipart body with one file field
pub fn multipart_body(field: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"leaf.png\"\r\n",
            field
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// `POST uri` with a multipart upload
pub fn upload(uri: &str, field: &str, bytes: &[u8], auth: Option<&str>) -> Request<Body> {
    let body = multipart_body(field, bytes);
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::CONTENT_LENGTH, body.len());

    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }

    builder.body(Body::from(body)).unwrap()
}

/// Request with a JSON body
pub fn json_request(method: &str, uri: &str, body: &JsonValue, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }

    builder.body(Body::from(body.to_string())).unwrap()
}

/// Request without a body
pub fn empty_request(method: &str, uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }

    builder.body(Body::empty()).unwrap()
}
