//! Bearer credential extraction.
//!
//! Accepts exactly one `Authorization` header of the form
//! `Bearer <token>`. The scheme is matched case-insensitively; the token
//! must be a single non-empty run of non-whitespace characters.

use crate::errors::AuthError;
use axum::http::{header::AUTHORIZATION, HeaderMap};

const BEARER_SCHEME: &str = "bearer";

/// Pull the bearer token out of request headers.
///
/// Performs no validation of the token itself.
///
/// # Errors
///
/// Returns `AuthError::MissingToken` when the header is absent, repeated,
/// not visible ASCII, uses another scheme, or carries an empty or
/// multi-part token.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    let mut values = headers.get_all(AUTHORIZATION).iter();
    let (Some(value), None) = (values.next(), values.next()) else {
        tracing::debug!(target: "api.middleware.auth", "Missing or repeated Authorization header");
        return Err(AuthError::MissingToken);
    };

    let value = value.to_str().map_err(|_| {
        tracing::debug!(target: "api.middleware.auth", "Authorization header is not visible ASCII");
        AuthError::MissingToken
    })?;

    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case(BEARER_SCHEME) => {
            Ok(token)
        }
        _ => {
            tracing::debug!(target: "api.middleware.auth", "Invalid Authorization header format");
            Err(AuthError::MissingToken)
        }
    }
}
