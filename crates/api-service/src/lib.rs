//! API Service Library
//!
//! HTTP API whose private routes sit behind a bearer-token authentication
//! gate. Tokens are JWTs issued by an external identity authority and
//! verified against the authority's published JWKS.
//!
//! # Request flow
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth/{extractor,jwt,jwks}.rs -> handlers/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Key resolver, token extractor, JWT validator, claims
//! - `config` - Service configuration from environment
//! - `errors` - Authentication errors with HTTP mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Auth gate and HTTP metrics
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
