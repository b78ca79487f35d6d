//! JWT utilities shared across ERP API components.
//!
//! This module provides the pieces of JWT handling that do not depend on a
//! particular key source or claims shape:
//! - Size limits for DoS prevention
//! - Clock skew constants
//! - Unverified header inspection (`alg` and `kid`) for key lookup
//! - Time-window validation for `exp`, `nbf` and `iat`
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Header values are only used to select a key and an algorithm from an
//!   allow-list; the signature MUST still be verified afterwards
//! - Error messages are generic to prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{peek_header, check_time_window, DEFAULT_CLOCK_SKEW};
//!
//! let header = peek_header(token)?;
//! // look up header.kid, verify the signature with header.alg ...
//! check_time_window(claims.exp, claims.nbf, claims.iat, DEFAULT_CLOCK_SKEW, now)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this are rejected BEFORE any base64 decoding or
/// cryptographic work. Typical access tokens are well under 2KB, even with
/// RSA signatures and a handful of profile claims.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (1 minute).
///
/// Applied symmetrically to `exp`, `nbf` and `iat` checks to absorb clock
/// drift between the token issuer and this service.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Configuration above this value is rejected at startup.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting an unverified JWT.
///
/// Note: Display output is intentionally generic. Detailed information is
/// logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWS compact structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token is missing the required `kid` header.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token is missing the required `alg` header.
    #[error("The access token is invalid or expired")]
    MissingAlgorithm,
}

/// Reasons a token's validity window check can fail.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindowViolation {
    /// `exp` has passed (beyond the clock skew tolerance).
    #[error("token expired")]
    Expired,

    /// `nbf` is still in the future (beyond the clock skew tolerance).
    #[error("token not yet valid")]
    NotYetValid,

    /// `iat` is in the future (beyond the clock skew tolerance).
    #[error("token issued in the future")]
    IssuedInFuture,
}

// =============================================================================
// Header Types
// =============================================================================

/// The parts of a JWT header needed to pick a verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Declared signing algorithm (e.g. `RS256`, `EdDSA`). Untrusted.
    pub alg: String,

    /// Declared key identifier. Untrusted; only used for key lookup.
    pub kid: String,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    alg: Option<serde_json::Value>,
    #[serde(default)]
    kid: Option<serde_json::Value>,
}

// =============================================================================
// Functions
// =============================================================================

/// Read `alg` and `kid` from a JWT header without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing
/// - This function does NOT validate the token signature
/// - The returned values must only be used for allow-list checks and key
///   lookup in a trusted key set
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - not three dot-separated parts, bad base64 or bad JSON
/// - `MissingAlgorithm` - `alg` absent, empty, or not a string
/// - `MissingKid` - `kid` absent, empty, or not a string
pub fn peek_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWS compact format: header.payload.signature
    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let alg = non_empty_string(header.alg).ok_or(JwtValidationError::MissingAlgorithm)?;
    let kid = non_empty_string(header.kid).ok_or(JwtValidationError::MissingKid)?;

    Ok(TokenHeader { alg, kid })
}

fn non_empty_string(value: Option<serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// Check a token's validity window against an explicit `now` timestamp.
///
/// A token is inside its window when `nbf - skew <= now < exp + skew` and
/// its `iat` (when present) is no more than `skew` in the future. All values
/// are Unix epoch seconds.
///
/// # Errors
///
/// Returns the first violated bound, checked in the order expiry,
/// not-before, issued-at.
pub fn check_time_window(
    exp: i64,
    nbf: Option<i64>,
    iat: Option<i64>,
    clock_skew: Duration,
    now: i64,
) -> Result<(), TimeWindowViolation> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW by configuration
    #[allow(clippy::cast_possible_wrap)]
    let skew = clock_skew.as_secs() as i64;

    if now >= exp.saturating_add(skew) {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            clock_skew_secs = skew,
            "Token rejected: expired"
        );
        return Err(TimeWindowViolation::Expired);
    }

    if let Some(nbf) = nbf {
        if now < nbf.saturating_sub(skew) {
            tracing::debug!(
                target: "common.jwt",
                nbf = nbf,
                now = now,
                clock_skew_secs = skew,
                "Token rejected: not yet valid"
            );
            return Err(TimeWindowViolation::NotYetValid);
        }
    }

    if let Some(iat) = iat {
        if iat > now.saturating_add(skew) {
            tracing::debug!(
                target: "common.jwt",
                iat = iat,
                now = now,
                clock_skew_secs = skew,
                "Token rejected: iat too far in the future"
            );
            return Err(TimeWindowViolation::IssuedInFuture);
        }
    }

    Ok(())
}

/// Current Unix time in seconds.
#[must_use]
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Decode an Ed25519 public key from a JWK `x` field (base64url, no padding).
///
/// # Errors
///
/// Returns `base64::DecodeError` if the content is not valid base64url.
pub fn decode_ed25519_public_key_jwk(x_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(x_b64url)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with_header(header: &str) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        format!("{header_b64}.payload.signature")
    }

    // -------------------------------------------------------------------------
    // Constants Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_default_clock_skew_is_within_max() {
        assert!(DEFAULT_CLOCK_SKEW <= MAX_CLOCK_SKEW);
    }

    // -------------------------------------------------------------------------
    // peek_header Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_peek_header_valid_token() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT","kid":"key-01"}"#);

        let header = peek_header(&token).unwrap();
        assert_eq!(header.alg, "RS256");
        assert_eq!(header.kid, "key-01");
    }

    #[test]
    fn test_peek_header_missing_kid() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT"}"#);
        assert_eq!(peek_header(&token), Err(JwtValidationError::MissingKid));
    }

    #[test]
    fn test_peek_header_empty_kid() {
        let token = token_with_header(r#"{"alg":"RS256","kid":""}"#);
        assert_eq!(peek_header(&token), Err(JwtValidationError::MissingKid));
    }

    #[test]
    fn test_peek_header_non_string_kid() {
        let token = token_with_header(r#"{"alg":"RS256","kid":12345}"#);
        assert_eq!(peek_header(&token), Err(JwtValidationError::MissingKid));

        let token = token_with_header(r#"{"alg":"RS256","kid":null}"#);
        assert_eq!(peek_header(&token), Err(JwtValidationError::MissingKid));
    }

    #[test]
    fn test_peek_header_missing_alg() {
        let token = token_with_header(r#"{"typ":"JWT","kid":"key-01"}"#);
        assert_eq!(peek_header(&token), Err(JwtValidationError::MissingAlgorithm));
    }

    #[test]
    fn test_peek_header_malformed_structure() {
        assert_eq!(
            peek_header("not.a.valid.jwt.format"),
            Err(JwtValidationError::MalformedToken)
        );
        assert_eq!(peek_header("only.two"), Err(JwtValidationError::MalformedToken));
        assert_eq!(peek_header("single"), Err(JwtValidationError::MalformedToken));
        assert_eq!(peek_header(""), Err(JwtValidationError::MalformedToken));
    }

    #[test]
    fn test_peek_header_invalid_base64() {
        assert_eq!(
            peek_header("!!!invalid!!!.payload.signature"),
            Err(JwtValidationError::MalformedToken)
        );
    }

    #[test]
    fn test_peek_header_invalid_json() {
        let token = token_with_header("not valid json");
        assert_eq!(peek_header(&token), Err(JwtValidationError::MalformedToken));
    }

    #[test]
    fn test_peek_header_oversized_token() {
        let token = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(peek_header(&token), Err(JwtValidationError::TokenTooLarge));
    }

    #[test]
    fn test_peek_header_at_size_limit_is_parsed() {
        let base = token_with_header(r#"{"alg":"EdDSA","kid":"k"}"#);
        let padding = "a".repeat(MAX_JWT_SIZE_BYTES - base.len());
        let token = format!("{base}{padding}");
        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);

        let header = peek_header(&token).unwrap();
        assert_eq!(header.kid, "k");
    }

    // -------------------------------------------------------------------------
    // check_time_window Tests
    // -------------------------------------------------------------------------

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_time_window_valid() {
        assert_eq!(
            check_time_window(NOW + 3600, Some(NOW - 10), Some(NOW - 10), Duration::ZERO, NOW),
            Ok(())
        );
    }

    #[test]
    fn test_time_window_expired_by_one_second() {
        assert_eq!(
            check_time_window(NOW - 1, None, None, Duration::ZERO, NOW),
            Err(TimeWindowViolation::Expired)
        );
    }

    #[test]
    fn test_time_window_exp_equal_to_now_is_expired() {
        assert_eq!(
            check_time_window(NOW, None, None, Duration::ZERO, NOW),
            Err(TimeWindowViolation::Expired)
        );
    }

    #[test]
    fn test_time_window_expired_within_skew_is_accepted() {
        let skew = Duration::from_secs(60);
        assert_eq!(check_time_window(NOW - 59, None, None, skew, NOW), Ok(()));
        assert_eq!(
            check_time_window(NOW - 60, None, None, skew, NOW),
            Err(TimeWindowViolation::Expired)
        );
    }

    #[test]
    fn test_time_window_not_yet_valid() {
        assert_eq!(
            check_time_window(NOW + 3600, Some(NOW + 1), None, Duration::ZERO, NOW),
            Err(TimeWindowViolation::NotYetValid)
        );
    }

    #[test]
    fn test_time_window_nbf_equal_to_now_is_valid() {
        assert_eq!(
            check_time_window(NOW + 3600, Some(NOW), None, Duration::ZERO, NOW),
            Ok(())
        );
    }

    #[test]
    fn test_time_window_nbf_within_skew() {
        let skew = Duration::from_secs(30);
        assert_eq!(
            check_time_window(NOW + 3600, Some(NOW + 30), None, skew, NOW),
            Ok(())
        );
        assert_eq!(
            check_time_window(NOW + 3600, Some(NOW + 31), None, skew, NOW),
            Err(TimeWindowViolation::NotYetValid)
        );
    }

    #[test]
    fn test_time_window_iat_in_future() {
        assert_eq!(
            check_time_window(NOW + 7200, None, Some(NOW + 3600), Duration::from_secs(60), NOW),
            Err(TimeWindowViolation::IssuedInFuture)
        );
    }

    #[test]
    fn test_time_window_iat_at_skew_boundary() {
        let skew = Duration::from_secs(60);
        assert_eq!(
            check_time_window(NOW + 3600, None, Some(NOW + 60), skew, NOW),
            Ok(())
        );
    }

    #[test]
    fn test_time_window_extreme_values_do_not_overflow() {
        assert_eq!(
            check_time_window(i64::MAX, Some(i64::MIN), None, MAX_CLOCK_SKEW, NOW),
            Ok(())
        );
    }

    // -------------------------------------------------------------------------
    // Key decoding Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_decode_ed25519_public_key_jwk() {
        let x = URL_SAFE_NO_PAD.encode([7u8; 32]);
        let bytes = decode_ed25519_public_key_jwk(&x).unwrap();
        assert_eq!(bytes, vec![7u8; 32]);
    }

    #[test]
    fn test_decode_ed25519_public_key_jwk_invalid() {
        assert!(decode_ed25519_public_key_jwk("!!!invalid-base64!!!").is_err());
    }
}
