/// Rate limiting middleware for detection endpoints
///
/// Token bucket per client address, kept in memory.
///
/// # Algorithm
///
/// - Bucket capacity is `RATE_LIMIT_PER_MINUTE`
/// - Tokens refill at capacity / 60 per second
/// - Each request consumes 1 token
/// - Request rejected with 429 if the bucket is empty
///
/// # Headers
///
/// - `X-RateLimit-Limit`: Bucket capacity
/// - `X-RateLimit-Remaining`: Whole tokens left
/// - `Retry-After`: Seconds to wait (429 responses only)

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::client_ip::ClientIp;
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::time::Instant;

/// Bucket count above which full buckets are dropped
const PRUNE_THRESHOLD: usize = 10_000;

/// Rate limit parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    /// Maximum tokens in bucket (burst capacity)
    pub bucket_capacity: u32,

    /// Token refill rate (tokens per second)
    pub refill_rate: f64,
}

impl RateLimit {
    /// Limit allowing `n` requests per minute
    pub fn per_minute(n: u32) -> Self {
        RateLimit {
            bucket_capacity: n,
            refill_rate: n as f64 / 60.0,
        }
    }
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, now: Instant) -> Self {
        TokenBucket {
            tokens: capacity as f64,
            last_refill: now,
        }
    }

    fn refill(&mut self, limit: RateLimit, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * limit.refill_rate).min(limit.bucket_capacity as f64);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn seconds_until_available(&self, rate: f64) -> u64 {
        let deficit = 1.0 - self.tokens;
        if deficit <= 0.0 {
            0
        } else {
            (deficit / rate).ceil() as u64
        }
    }

    fn is_full(&self, capacity: u32) -> bool {
        self.tokens >= capacity as f64
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether request is allowed
    pub ok: bool,

    /// Whole tokens remaining
    pub remaining: u32,

    /// Seconds until the next token (0 when allowed)
    pub retry_after: u64,
}

/// In-memory per-address token buckets
#[derive(Debug)]
pub struct RateLimiter {
    limit: RateLimit,
    buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Takes one token for `key`
    pub fn check(&self, key: IpAddr) -> RateLimitResult {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: IpAddr, now: Instant) -> RateLimitResult {
        let limit = self.limit;
        let mut buckets = self.buckets.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if buckets.len() >= PRUNE_THRESHOLD {
            buckets.retain(|_, bucket| {
                bucket.refill(limit, now);
                !bucket.is_full(limit.bucket_capacity)
            });
        }

        let bucket = buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(limit.bucket_capacity, now));
        bucket.refill(limit, now);

        if bucket.try_consume() {
            RateLimitResult {
                ok: true,
                remaining: bucket.tokens.floor() as u32,
                retry_after: 0,
            }
        } else {
            RateLimitResult {
                ok: false,
                remaining: 0,
                retry_after: bucket.seconds_until_available(limit.refill_rate).max(1),
            }
        }
    }
}

/// Rate limiting middleware layer
///
/// Disabled when the state carries no limiter (`RATE_LIMIT_PER_MINUTE=0`).
///
/// # Errors
///
/// - 429 Too Many Requests: Rate limit exceeded
pub async fn rate_limit_layer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(limiter) = state.rate_limiter.as_deref() else {
        return next.run(request).await;
    };

    let ip = request
        .extensions()
        .get::<ClientIp>()
        .map(|c| c.0)
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let result = limiter.check(ip);
    let mut response = if result.ok {
        next.run(request).await
    } else {
        tracing::warn!(client_ip = %ip, retry_after = result.retry_after, "Rate limit exceeded");
        ApiError::RateLimitExceeded {
            retry_after: result.retry_after,
            message: format!("Rate limit exceeded. Try again in {} seconds", result.retry_after),
        }
        .into_response()
    };

    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limiter.limit().bucket_capacity));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(result.remaining));

    response
}
