//! Test server harness for E2E testing
//!
//! Provides `TestApiServer` for spawning real API server instances in tests.

use api_service::auth::{HttpKeySource, JwtValidator, KeyResolver, ProfileClaimsDecoder};
use api_service::config::Config;
use api_service::middleware::AuthState;
use api_service::routes;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the API server in E2E tests.
///
/// Configured with issuer `https://example-authority/`, audience
/// `api-audience`, algorithm `EdDSA` and zero clock skew unless overridden.
///
/// # Example
/// ```rust,ignore
/// let jwks = MockJwks::start(&[&key]).await;
/// let server = TestApiServer::spawn(&jwks.url()).await?;
///
/// let response = reqwest::get(format!("{}/api/health", server.url())).await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestApiServer {
    addr: SocketAddr,
    config: Config,
    resolver: KeyResolver,
    handle: JoinHandle<()>,
}

impl TestApiServer {
    /// Spawn a server validating tokens against the key set at `jwks_url`.
    pub async fn spawn(jwks_url: &str) -> Result<Self, anyhow::Error> {
        Self::spawn_with(jwks_url, &[]).await
    }

    /// Spawn a server with extra environment-style configuration overrides.
    ///
    /// # Arguments
    /// * `jwks_url` - Key set endpoint (typically a [`crate::MockJwks`])
    /// * `overrides` - `(VARIABLE, value)` pairs applied on top of the defaults
    pub async fn spawn_with(
        jwks_url: &str,
        overrides: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("AUTH_DOMAIN".to_string(), "example-authority".to_string()),
            ("AUTH_AUDIENCE".to_string(), "api-audience".to_string()),
            ("AUTH_JWKS_URL".to_string(), jwks_url.to_string()),
            ("AUTH_ALLOWED_ALGORITHMS".to_string(), "EdDSA".to_string()),
            ("JWT_CLOCK_SKEW_SECONDS".to_string(), "0".to_string()),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ]);
        for (name, value) in overrides {
            vars.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let resolver = KeyResolver::with_stale_fallback(
            Arc::new(HttpKeySource::new(config.jwks_url.clone())),
            config.jwks_cache_ttl,
            config.jwks_stale_fallback,
        );
        let validator = JwtValidator::new(
            resolver.clone(),
            ProfileClaimsDecoder::new(),
            config.validation_policy(),
        );
        let auth_state = Arc::new(AuthState::new(validator));

        // Handle without a global recorder; tests in one process may spawn many servers
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let app = routes::build_routes(&config, auth_state, metrics_handle);

        let listener = tokio::net::TcpListener::bind(&config.bind_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            resolver,
            handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The server's key resolver, for inspecting fetch counts.
    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }
}

impl Drop for TestApiServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockJwks, TestKeypair};

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let key = TestKeypair::new(1, "key-1");
        let jwks = MockJwks::start(&[&key]).await;
        let server = TestApiServer::spawn(&jwks.url()).await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));
        assert!(server.addr().port() > 0);
        assert_eq!(server.config().issuer, "https://example-authority/");

        let response = reqwest::get(format!("{}/api/health", server.url())).await?;
        assert_eq!(response.status(), 200);

        let body: serde_json::Value = response.json().await?;
        assert_eq!(body["status"], "healthy");

        // Health never touches the key source
        assert_eq!(server.resolver().fetch_attempts(), 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_overrides_apply() -> Result<(), anyhow::Error> {
        let server = TestApiServer::spawn_with(
            "http://127.0.0.1:1/jwks.json",
            &[("JWT_CLOCK_SKEW_SECONDS", "30")],
        )
        .await?;

        assert_eq!(server.config().jwt_clock_skew.as_secs(), 30);
        Ok(())
    }
}
