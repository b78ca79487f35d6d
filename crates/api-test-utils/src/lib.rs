//! # API Test Utilities
//!
//! Shared test utilities for the API service.
//!
//! This crate provides:
//! - Deterministic Ed25519 signing keys published as JWKs
//! - Fluent builder for token claims
//! - Mock JWKS endpoint (wiremock)
//! - Server test harness (`TestApiServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use api_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let key = TestKeypair::new(1, "key-1");
//!     let jwks = MockJwks::start(&[&key]).await;
//!     let server = TestApiServer::spawn(&jwks.url()).await?;
//!
//!     let token = key.sign(&TestTokenBuilder::new().build());
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/api/private/profile", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_mock;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_mock::*;
pub use server_harness::*;
pub use token_builders::*;
