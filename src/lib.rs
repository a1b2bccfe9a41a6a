//! Turnstile - Per-client Admission Control
//!
//! This crate implements per-client token-bucket rate limiting for HTTP
//! services. Each caller key owns a bucket that refills continuously and is
//! checked once per request. State is kept in process memory only; instances
//! do not coordinate.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
