/// API route handlers
///
/// - `health`: Ping and health check
/// - `user`: Registration, login and profile
/// - `calc`: Downy, powdery and frogeye detection
/// - `records`: Stored detection results

pub mod calc;
pub mod health;
pub mod records;
pub mod user;
