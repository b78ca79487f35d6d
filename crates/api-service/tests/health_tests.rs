//! Public endpoint integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use anyhow::Result;
use api_test_utils::{MockJwks, TestApiServer, TestKeypair};

async fn spawn_server() -> Result<(MockJwks, TestApiServer)> {
    let key = TestKeypair::new(1, "key-1");
    // Public routes never consult the key source
    let jwks = MockJwks::start_expecting(&[&key], 0).await;
    let server = TestApiServer::spawn(&jwks.url()).await?;
    Ok((jwks, server))
}

#[tokio::test]
async fn test_health_endpoint_is_public() -> Result<()> {
    let (_jwks, server) = spawn_server().await?;

    let response = reqwest::get(format!("{}/api/health", server.url())).await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    Ok(())
}

#[tokio::test]
async fn test_public_endpoint() -> Result<()> {
    let (_jwks, server) = spawn_server().await?;

    let response = reqwest::get(format!("{}/api/public", server.url())).await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "success");
    assert!(body["data"].is_null());

    Ok(())
}

#[tokio::test]
async fn test_public_endpoint_ignores_bad_credentials() -> Result<()> {
    let (_jwks, server) = spawn_server().await?;

    let response = reqwest::Client::new()
        .get(format!("{}/api/public", server.url()))
        .header("Authorization", "Bearer not-a-token")
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_is_public() -> Result<()> {
    let (_jwks, server) = spawn_server().await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;

    assert_eq!(response.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_unknown_route_returns_404() -> Result<()> {
    let (_jwks, server) = spawn_server().await?;

    let response = reqwest::get(format!("{}/api/nope", server.url())).await?;

    assert_eq!(response.status(), 404);
    Ok(())
}
