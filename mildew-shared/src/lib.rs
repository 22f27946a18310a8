//! # Mildew Shared Library
//!
//! This crate contains the persistence and authentication layer shared by the
//! Mildew API server and the command line tools.
//!
//! ## Module Organization
//!
//! - `db`: SQLite connection pool and embedded migrations
//! - `models`: Database models (users, detection records)
//! - `auth`: Password hashing and JWT utilities

pub mod auth;
pub mod db;
pub mod models;

/// Current version of the Mildew shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
