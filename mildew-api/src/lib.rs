//! # Mildew API Server Library
//!
//! HTTP surface for soybean leaf disease detection.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `envelope`: Result envelope of the detection endpoints
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Security headers, client address, rate limiting, auth
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod envelope;
pub mod error;
pub mod middleware;
pub mod routes;
