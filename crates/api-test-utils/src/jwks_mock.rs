//! Mock JWKS endpoint
//!
//! Wraps a wiremock server publishing a key set at
//! `/.well-known/jwks.json`. Expected fetch counts are verified when the
//! mock is dropped.

use crate::crypto_fixtures::{jwks_document, TestKeypair};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves the key set on.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Running mock JWKS endpoint.
pub struct MockJwks {
    server: MockServer,
}

impl MockJwks {
    /// Publish `keys`, any number of fetches allowed.
    pub async fn start(keys: &[&TestKeypair]) -> Self {
        Self::start_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)), None).await
    }

    /// Publish `keys` and require exactly `fetches` requests.
    pub async fn start_expecting(keys: &[&TestKeypair], fetches: u64) -> Self {
        Self::start_with(
            ResponseTemplate::new(200).set_body_json(jwks_document(keys)),
            Some(fetches),
        )
        .await
    }

    /// Publish `keys` after `delay`, requiring exactly `fetches` requests.
    ///
    /// The delay keeps a fetch in flight long enough for concurrent callers
    /// to pile up behind it.
    pub async fn start_delayed(keys: &[&TestKeypair], delay: Duration, fetches: u64) -> Self {
        Self::start_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks_document(keys))
                .set_delay(delay),
            Some(fetches),
        )
        .await
    }

    /// Endpoint that always fails with `status`.
    pub async fn start_failing(status: u16) -> Self {
        Self::start_with(ResponseTemplate::new(status), None).await
    }

    /// Endpoint that returns `body` verbatim with status 200.
    pub async fn start_raw(body: &str) -> Self {
        Self::start_with(
            ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json"),
            None,
        )
        .await
    }

    async fn start_with(template: ResponseTemplate, fetches: Option<u64>) -> Self {
        let server = MockServer::start().await;
        let mut mock = Mock::given(method("GET")).and(path(JWKS_PATH)).respond_with(template);
        if let Some(n) = fetches {
            mock = mock.expect(n);
        }
        mock.mount(&server).await;
        Self { server }
    }

    /// Full URL of the key set.
    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Number of key set requests received so far.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// Replace the published key set (key rotation).
    pub async fn rotate(&self, keys: &[&TestKeypair]) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .mount(&self.server)
            .await;
    }

    /// Make the endpoint start failing with `status`.
    pub async fn fail_with(&self, status: u16) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }
}
