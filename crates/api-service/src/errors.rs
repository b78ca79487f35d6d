//! Authentication error types.
//!
//! Every stage of the gate (extractor, resolver, validator) returns an
//! [`AuthError`]. The variant carries the precise reason for server-side
//! logging; the HTTP mapping in the `IntoResponse` impl collapses everything
//! except a missing credential into a single generic `invalid_token` body so
//! clients cannot probe which check failed.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::jwt::TimeWindowViolation;
use serde::Serialize;
use thiserror::Error;

/// Client-facing message for a missing or malformed credential.
pub const MISSING_TOKEN_MESSAGE: &str = "Access token not provided";

/// Client-facing message for every validation failure.
pub const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Specific registered-claim check that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClaimViolation {
    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("token issued in the future")]
    IssuedInFuture,

    #[error("token has no expiry")]
    MissingExpiry,

    #[error("wrong issuer")]
    WrongIssuer,

    #[error("wrong audience")]
    WrongAudience,
}

impl From<TimeWindowViolation> for ClaimViolation {
    fn from(violation: TimeWindowViolation) -> Self {
        match violation {
            TimeWindowViolation::Expired => ClaimViolation::Expired,
            TimeWindowViolation::NotYetValid => ClaimViolation::NotYetValid,
            TimeWindowViolation::IssuedInFuture => ClaimViolation::IssuedInFuture,
        }
    }
}

/// Authentication failure at any stage of the gate.
///
/// Maps to HTTP 401 in all cases:
/// - MissingToken: `missing_token`
/// - everything else: `invalid_token`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No usable `Authorization: Bearer <token>` header.
    #[error("Missing bearer token")]
    MissingToken,

    /// Token is not a well-formed JWS (size, structure, header).
    #[error("Malformed token")]
    MalformedToken,

    /// Declared algorithm is not in the allow-list or does not match the key.
    #[error("Algorithm not allowed: {0}")]
    AlgorithmNotAllowed(String),

    /// Key-publishing endpoint unreachable or returned unusable data.
    #[error("Key source unavailable: {0}")]
    KeySourceUnavailable(String),

    /// Token references a key identifier absent from the current key set.
    #[error("Unknown signing key: {0}")]
    UnknownKey(String),

    /// Signature does not verify against the resolved key.
    #[error("Invalid signature")]
    InvalidSignature,

    /// A registered claim (issuer, audience, time window) is violated.
    #[error("Claim validation failed: {0}")]
    ClaimValidationFailed(ClaimViolation),

    /// Claims payload could not be decoded into the expected shape.
    #[error("Malformed claims: {0}")]
    MalformedClaims(String),
}

impl AuthError {
    /// Machine-readable error code returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            _ => "invalid_token",
        }
    }

    /// Bounded label for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::MalformedToken => "malformed_token",
            AuthError::AlgorithmNotAllowed(_) => "algorithm_not_allowed",
            AuthError::KeySourceUnavailable(_) => "key_source_unavailable",
            AuthError::UnknownKey(_) => "unknown_key",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::ClaimValidationFailed(ClaimViolation::Expired) => "expired",
            AuthError::ClaimValidationFailed(ClaimViolation::NotYetValid) => "not_yet_valid",
            AuthError::ClaimValidationFailed(ClaimViolation::IssuedInFuture) => {
                "issued_in_future"
            }
            AuthError::ClaimValidationFailed(ClaimViolation::MissingExpiry) => "missing_expiry",
            AuthError::ClaimValidationFailed(ClaimViolation::WrongIssuer) => "wrong_issuer",
            AuthError::ClaimValidationFailed(ClaimViolation::WrongAudience) => "wrong_audience",
            AuthError::MalformedClaims(_) => "malformed_claims",
        }
    }
}

impl From<ClaimViolation> for AuthError {
    fn from(violation: ClaimViolation) -> Self {
        AuthError::ClaimValidationFailed(violation)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (message, challenge) = match &self {
            AuthError::MissingToken => (MISSING_TOKEN_MESSAGE, "Bearer realm=\"api\""),
            _ => (
                INVALID_TOKEN_MESSAGE,
                "Bearer realm=\"api\", error=\"invalid_token\"",
            ),
        };

        let body = ErrorResponse {
            error: self.code(),
            message,
        };

        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static(challenge),
        );
        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display_does_not_include_token_material() {
        let error = AuthError::UnknownKey("kid-1".to_string());
        assert_eq!(format!("{}", error), "Unknown signing key: kid-1");

        let error = AuthError::ClaimValidationFailed(ClaimViolation::WrongAudience);
        assert_eq!(format!("{}", error), "Claim validation failed: wrong audience");
    }

    #[test]
    fn test_codes_collapse_to_invalid_token() {
        assert_eq!(AuthError::MissingToken.code(), "missing_token");

        let validation_errors = [
            AuthError::MalformedToken,
            AuthError::AlgorithmNotAllowed("HS256".to_string()),
            AuthError::KeySourceUnavailable("timeout".to_string()),
            AuthError::UnknownKey("kid".to_string()),
            AuthError::InvalidSignature,
            AuthError::ClaimValidationFailed(ClaimViolation::Expired),
            AuthError::ClaimValidationFailed(ClaimViolation::WrongIssuer),
            AuthError::MalformedClaims("email".to_string()),
        ];
        for error in validation_errors {
            assert_eq!(error.code(), "invalid_token", "{:?}", error);
        }
    }

    #[test]
    fn test_time_window_violation_conversion() {
        assert_eq!(
            ClaimViolation::from(TimeWindowViolation::Expired),
            ClaimViolation::Expired
        );
        assert_eq!(
            ClaimViolation::from(TimeWindowViolation::NotYetValid),
            ClaimViolation::NotYetValid
        );
        assert_eq!(
            ClaimViolation::from(TimeWindowViolation::IssuedInFuture),
            ClaimViolation::IssuedInFuture
        );
    }

    #[tokio::test]
    async fn test_missing_token_response() {
        let response = AuthError::MissingToken.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer realm=\"api\""
        );

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"], "missing_token");
        assert_eq!(body["message"], MISSING_TOKEN_MESSAGE);
    }

    #[tokio::test]
    async fn test_invalid_token_response_hides_reason() {
        let response =
            AuthError::ClaimValidationFailed(ClaimViolation::WrongAudience).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let www_auth = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(www_auth.contains("invalid_token"));

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"], "invalid_token");
        assert_eq!(body["message"], INVALID_TOKEN_MESSAGE);
        assert!(!body.to_string().contains("audience"));
    }

    #[tokio::test]
    async fn test_key_source_unavailable_fails_closed() {
        let response =
            AuthError::KeySourceUnavailable("connection refused".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"], "invalid_token");
        assert!(!body.to_string().contains("connection refused"));
    }
}
