/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: Bind address (default: 0.0.0.0:5020)
/// - `TRUST_PROXY_HEADERS`: Take the client address from `X-Forwarded-For` (default: true)
/// - `CORS_ORIGINS`: Comma-separated origins, `*` for any (default: *)
/// - `PRODUCTION`: Enables HSTS (default: false)
/// - `ALLOW_LEGACY_USER_ID`: Accept `?user_id=` on `/calc/downy` in place of a token (default: false)
/// - `DATABASE_URL`: SQLite connection string (default: sqlite://database.db)
/// - `JWT_SECRET_KEY`: Secret key for JWT signing (required, 32+ characters)
/// - `JWT_TOKEN_EXPIRE_HOUR`: Token lifetime in hours, at most ten years (default: 24)
/// - `PASSWORD_SCHEME`: `bcrypt` or `argon2id` (default: bcrypt)
/// - `DETECTOR_BACKEND`: `mock`, `remote` or `onnx` (default: mock)
/// - `RATE_LIMIT_PER_MINUTE`: Detection requests per client per minute, 0 disables (default: 60)
/// - `RUST_LOG`: Log level
///
/// # Example
///
/// ```no_run
/// use mildew_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use mildew_engine::detector::{DetectParams, DetectorBackend, DetectorSettings, ModelPaths};
use mildew_shared::auth::password::PasswordScheme;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Minimum accepted length of `JWT_SECRET_KEY`
pub const MIN_SECRET_LEN: usize = 32;

/// Longest accepted token lifetime: ten years
pub const MAX_EXPIRE_HOURS: f64 = 10.0 * 365.0 * 24.0;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT and credential configuration
    pub jwt: JwtConfig,

    /// Detector backends and inference limits
    pub detection: DetectionConfig,

    /// Where result images go
    pub storage: StorageConfig,

    /// Per-client limits on detection endpoints
    pub rate_limit: RateLimitConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Whether `X-Forwarded-For` / `X-Real-IP` are believed
    pub trust_proxy_headers: bool,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Production mode (HSTS on)
    pub production: bool,

    /// Identify `/calc/downy` callers by `?user_id=` when no token is sent
    pub allow_legacy_user_id: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// IMPORTANT: This must be kept secret and be at least 32 characters.
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,

    /// Access token lifetime in hours
    pub expire_hours: f64,

    /// Scheme used when hashing new passwords
    pub password_scheme: PasswordScheme,
}

/// Detection configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub backend: DetectorBackend,
    pub models: ModelPaths,
    pub remote_url: Option<String>,
    pub mock_data_dir: PathBuf,

    /// Thresholds for downy and powdery
    pub params: DetectParams,

    /// Thresholds for frogeye
    pub frogeye_params: DetectParams,

    /// Inferences allowed to run at once
    pub concurrency: usize,

    /// Upper bound on one inference
    pub timeout: Duration,

    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::Mock,
            models: ModelPaths::default(),
            remote_url: None,
            mock_data_dir: PathBuf::from("mock_data"),
            params: DetectParams::default(),
            frogeye_params: DetectParams::new(0.05, 0.05),
            concurrency: 2,
            timeout: Duration::from_secs(60),
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl DetectionConfig {
    /// Settings the detector registry is built from
    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            backend: self.backend,
            models: self.models.clone(),
            mock_data_dir: self.mock_data_dir.clone(),
            remote_url: self.remote_url.clone(),
            timeout: self.timeout,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Annotated downy results, kept for inspection
    pub image_cache_dir: PathBuf,

    /// Root served under `/static`
    pub static_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            image_cache_dir: PathBuf::from("assets/image_cache"),
            static_dir: PathBuf::from("static"),
        }
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Bucket capacity; 0 turns rate limiting off
    pub per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { per_minute: 60 }
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `JWT_SECRET_KEY` is missing or shorter than 32 characters
    /// - Any variable has an unparsable value
    /// - `DETECTOR_BACKEND=remote` without `REMOTE_DETECTOR_URL`
    /// - `JWT_TOKEN_EXPIRE_HOUR` is not a positive number of hours up to ten years
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET_KEY")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET_KEY environment variable is required"))?;

        if jwt_secret.len() < MIN_SECRET_LEN {
            anyhow::bail!("JWT_SECRET_KEY must be at least {} characters long", MIN_SECRET_LEN);
        }

        let expire_hours = validate_expire_hours(parse_var("JWT_TOKEN_EXPIRE_HOUR", 24.0)?)?;

        let defaults = DetectionConfig::default();
        let backend: DetectorBackend = parse_var("DETECTOR_BACKEND", defaults.backend)?;
        let remote_url = env::var("REMOTE_DETECTOR_URL").ok().filter(|u| !u.is_empty());
        if backend == DetectorBackend::Remote && remote_url.is_none() {
            anyhow::bail!("REMOTE_DETECTOR_URL is required when DETECTOR_BACKEND=remote");
        }

        let concurrency: usize = parse_var("INFERENCE_CONCURRENCY", defaults.concurrency)?;
        if concurrency == 0 {
            anyhow::bail!("INFERENCE_CONCURRENCY must be at least 1");
        }

        Ok(Self {
            api: ApiConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("API_PORT", 5020)?,
                trust_proxy_headers: parse_bool("TRUST_PROXY_HEADERS", true)?,
                cors_origins: env::var("CORS_ORIGINS")
                    .unwrap_or_else(|_| "*".to_string())
                    .split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect(),
                production: parse_bool("PRODUCTION", false)?,
                allow_legacy_user_id: parse_bool("ALLOW_LEGACY_USER_ID", false)?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://database.db".to_string()),
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                expire_hours,
                password_scheme: parse_var("PASSWORD_SCHEME", PasswordScheme::default())?,
            },
            detection: DetectionConfig {
                backend,
                models: ModelPaths {
                    downy: path_var("DOWNY_MODEL", defaults.models.downy),
                    powdery: path_var("POWDERY_MODEL", defaults.models.powdery),
                    frogeye: path_var("FROGEYE_MODEL", defaults.models.frogeye),
                },
                remote_url,
                mock_data_dir: path_var("MOCK_DATA_DIR", defaults.mock_data_dir),
                params: DetectParams::new(
                    parse_var("DETECT_CONF", defaults.params.conf)?,
                    parse_var("DETECT_IOU", defaults.params.iou)?,
                ),
                frogeye_params: DetectParams::new(
                    parse_var("FROGEYE_CONF", defaults.frogeye_params.conf)?,
                    parse_var("FROGEYE_IOU", defaults.frogeye_params.iou)?,
                ),
                concurrency,
                timeout: Duration::from_secs(parse_var("INFERENCE_TIMEOUT_SECS", 60)?),
                max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            },
            storage: StorageConfig {
                image_cache_dir: path_var("IMAGE_CACHE_DIR", PathBuf::from("assets/image_cache")),
                static_dir: path_var("STATIC_DIR", PathBuf::from("static")),
            },
            rate_limit: RateLimitConfig {
                per_minute: parse_var("RATE_LIMIT_PER_MINUTE", 60)?,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether any origin may call the API
    pub fn cors_allows_any(&self) -> bool {
        self.api.cors_origins.iter().any(|o| o == "*")
    }
}

/// Rejects lifetimes that are not finite, not positive or beyond [`MAX_EXPIRE_HOURS`]
pub fn validate_expire_hours(hours: f64) -> anyhow::Result<f64> {
    if !hours.is_finite() || hours <= 0.0 || hours > MAX_EXPIRE_HOURS {
        anyhow::bail!(
            "JWT_TOKEN_EXPIRE_HOUR must be greater than 0 and at most {} hours, got {}",
            MAX_EXPIRE_HOURS,
            hours
        );
    }
    Ok(hours)
}

fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e)),
        _ => Ok(default),
    }
}

fn parse_bool(key: &str, default: bool) -> anyhow::Result<bool> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            "" => Ok(default),
            other => anyhow::bail!("Invalid value for {}: {}", key, other),
        },
        Err(_) => Ok(default),
    }
}

fn path_var(key: &str, default: PathBuf) -> PathBuf {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or(default)
}
