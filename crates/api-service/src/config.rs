//! API service configuration.
//!
//! Configuration is loaded from environment variables and validated before
//! the server starts. Nothing in it is secret, so Debug output is safe to log.

use crate::auth::jwks::DEFAULT_CACHE_TTL;
use crate::auth::ValidationPolicy;
use axum::http::HeaderValue;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use jsonwebtoken::Algorithm;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default listen port when `BIND_ADDRESS` is unset.
pub const DEFAULT_SERVER_PORT: u16 = 6060;

/// Upper bound for `JWKS_CACHE_TTL_SECONDS` (one day).
pub const MAX_JWKS_CACHE_TTL: Duration = Duration::from_secs(86_400);

/// Upper bound for `JWKS_STALE_FALLBACK_SECONDS` (one hour).
pub const MAX_JWKS_STALE_FALLBACK: Duration = Duration::from_secs(3_600);

/// Algorithms accepted when `AUTH_ALLOWED_ALGORITHMS` is unset.
pub const DEFAULT_ALLOWED_ALGORITHMS: &[Algorithm] = &[Algorithm::RS256];

/// API service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity authority domain (e.g. `example-authority.eu.auth0.com`).
    pub auth_domain: String,

    /// Audience that every accepted token must carry.
    pub audience: String,

    /// Exact expected `iss` claim (default: `https://<domain>/`).
    pub issuer: String,

    /// JWKS endpoint (default: `https://<domain>/.well-known/jwks.json`).
    pub jwks_url: String,

    /// Algorithms a token may declare.
    pub allowed_algorithms: Vec<Algorithm>,

    /// How long a fetched key set is served before refreshing.
    pub jwks_cache_ttl: Duration,

    /// How long past expiry a key set may still be served when the key
    /// source is down. Zero disables the fallback.
    pub jwks_stale_fallback: Duration,

    /// Clock skew tolerance for `exp`, `nbf` and `iat`.
    pub jwt_clock_skew: Duration,

    /// Server bind address (default: `0.0.0.0:6060`).
    pub bind_address: String,

    /// Allowed CORS origin. Any origin when unset.
    pub client_origin_url: Option<HeaderValue>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid auth domain: {0}")]
    InvalidAuthDomain(String),

    #[error("Invalid allowed algorithms: {0}")]
    InvalidAlgorithms(String),

    #[error("Invalid JWKS cache configuration: {0}")]
    InvalidJwksCache(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid server address: {0}")]
    InvalidServerAddress(String),

    #[error("Invalid client origin: {0}")]
    InvalidClientOrigin(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let auth_domain = required(vars, "AUTH_DOMAIN")?
            .trim_end_matches('/')
            .to_string();
        if auth_domain.contains("://") || auth_domain.contains('/') {
            return Err(ConfigError::InvalidAuthDomain(format!(
                "AUTH_DOMAIN must be a bare host name, got '{auth_domain}'"
            )));
        }

        let audience = required(vars, "AUTH_AUDIENCE")?;

        let issuer = optional(vars, "AUTH_ISSUER")
            .unwrap_or_else(|| format!("https://{auth_domain}/"));

        let jwks_url = optional(vars, "AUTH_JWKS_URL")
            .unwrap_or_else(|| format!("https://{auth_domain}/.well-known/jwks.json"));

        let allowed_algorithms = match optional(vars, "AUTH_ALLOWED_ALGORITHMS") {
            Some(list) => parse_algorithms(&list)?,
            None => DEFAULT_ALLOWED_ALGORITHMS.to_vec(),
        };

        let jwks_cache_ttl = parse_seconds(vars, "JWKS_CACHE_TTL_SECONDS", ConfigError::InvalidJwksCache)?
            .unwrap_or(DEFAULT_CACHE_TTL);
        if jwks_cache_ttl.is_zero() {
            return Err(ConfigError::InvalidJwksCache(
                "JWKS_CACHE_TTL_SECONDS must be greater than 0".to_string(),
            ));
        }
        if jwks_cache_ttl > MAX_JWKS_CACHE_TTL {
            return Err(ConfigError::InvalidJwksCache(format!(
                "JWKS_CACHE_TTL_SECONDS must not exceed {} seconds, got {}",
                MAX_JWKS_CACHE_TTL.as_secs(),
                jwks_cache_ttl.as_secs()
            )));
        }

        let jwks_stale_fallback =
            parse_seconds(vars, "JWKS_STALE_FALLBACK_SECONDS", ConfigError::InvalidJwksCache)?
                .unwrap_or(Duration::ZERO);
        if jwks_stale_fallback > MAX_JWKS_STALE_FALLBACK {
            return Err(ConfigError::InvalidJwksCache(format!(
                "JWKS_STALE_FALLBACK_SECONDS must not exceed {} seconds, got {}",
                MAX_JWKS_STALE_FALLBACK.as_secs(),
                jwks_stale_fallback.as_secs()
            )));
        }

        let jwt_clock_skew =
            parse_seconds(vars, "JWT_CLOCK_SKEW_SECONDS", ConfigError::InvalidJwtClockSkew)?
                .unwrap_or(DEFAULT_CLOCK_SKEW);
        if jwt_clock_skew > MAX_CLOCK_SKEW {
            return Err(ConfigError::InvalidJwtClockSkew(format!(
                "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                MAX_CLOCK_SKEW.as_secs(),
                jwt_clock_skew.as_secs()
            )));
        }

        let bind_address = match optional(vars, "BIND_ADDRESS") {
            Some(address) => address,
            None => {
                let port = match optional(vars, "SERVER_PORT") {
                    Some(value) => value.parse::<u16>().map_err(|e| {
                        ConfigError::InvalidServerAddress(format!(
                            "SERVER_PORT must be a valid port number, got '{value}': {e}"
                        ))
                    })?,
                    None => DEFAULT_SERVER_PORT,
                };
                format!("0.0.0.0:{port}")
            }
        };

        let client_origin_url = optional(vars, "CLIENT_ORIGIN_URL")
            .map(|origin| {
                HeaderValue::from_str(&origin).map_err(|e| {
                    ConfigError::InvalidClientOrigin(format!(
                        "CLIENT_ORIGIN_URL is not a valid header value: {e}"
                    ))
                })
            })
            .transpose()?;

        Ok(Config {
            auth_domain,
            audience,
            issuer,
            jwks_url,
            allowed_algorithms,
            jwks_cache_ttl,
            jwks_stale_fallback,
            jwt_clock_skew,
            bind_address,
            client_origin_url,
        })
    }

    /// Validation policy derived from this configuration.
    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            allowed_algorithms: self.allowed_algorithms.clone(),
            clock_skew: self.jwt_clock_skew,
        }
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    optional(vars, name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Non-empty, trimmed value of `name`.
fn optional(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    error: fn(String) -> ConfigError,
) -> Result<Option<Duration>, ConfigError> {
    let Some(value) = optional(vars, name) else {
        return Ok(None);
    };

    let seconds: u64 = value.parse().map_err(|e| {
        error(format!(
            "{name} must be a valid non-negative integer, got '{value}': {e}"
        ))
    })?;

    Ok(Some(Duration::from_secs(seconds)))
}

fn parse_algorithms(list: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let mut algorithms = Vec::new();

    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let alg = Algorithm::from_str(name).map_err(|_| {
            ConfigError::InvalidAlgorithms(format!("unknown algorithm '{name}'"))
        })?;

        // Symmetric algorithms would require sharing the verification secret
        if matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::InvalidAlgorithms(format!(
                "HMAC algorithm '{name}' is not allowed"
            )));
        }

        if !algorithms.contains(&alg) {
            algorithms.push(alg);
        }
    }

    if algorithms.is_empty() {
        return Err(ConfigError::InvalidAlgorithms(
            "AUTH_ALLOWED_ALGORITHMS must name at least one algorithm".to_string(),
        ));
    }

    Ok(algorithms)
}
