//! Quotaguard - In-Process Rate Limiting
//!
//! This crate bounds how often a caller may perform an action, per identity
//! key, using fixed-window counters. Each [`ratelimit::RateLimiter`] enforces
//! one policy over its own keyed store; [`ratelimit::PolicyCatalog`] bundles
//! the standard policies for API calls, authentication, forms, email and
//! uploads. State lives in memory only and is never shared between processes.

pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod ratelimit;
