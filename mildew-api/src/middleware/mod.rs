/// Middleware modules for the API server
///
/// - `security`: Security response headers
/// - `client_ip`: Client address resolution behind proxies
/// - `rate_limit`: Per-client token buckets on detection endpoints
/// - `auth`: Bearer token extractors

pub mod auth;
pub mod client_ip;
pub mod rate_limit;
pub mod security;
