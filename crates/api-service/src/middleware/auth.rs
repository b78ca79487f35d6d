//! Authentication gate for protected routes.
//!
//! Extracts the bearer credential, validates it with the [`JwtValidator`],
//! and either rejects the request with 401 or attaches the
//! [`AuthenticatedIdentity`] to the request extensions before calling the
//! wrapped handler. The handler is never invoked on rejection.

use crate::auth::{extract_bearer, AuthenticatedIdentity, ClaimsDecoder, JwtValidator};
use crate::errors::AuthError;
use crate::observability::metrics::record_auth_outcome;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
pub struct AuthState<D: ClaimsDecoder> {
    /// JWT validator with key resolver.
    pub jwt_validator: Arc<JwtValidator<D>>,
}

// Manual impl: deriving would require `D: Clone`.
impl<D: ClaimsDecoder> Clone for AuthState<D> {
    fn clone(&self) -> Self {
        Self {
            jwt_validator: Arc::clone(&self.jwt_validator),
        }
    }
}

impl<D: ClaimsDecoder> AuthState<D> {
    pub fn new(jwt_validator: JwtValidator<D>) -> Self {
        Self {
            jwt_validator: Arc::new(jwt_validator),
        }
    }
}

/// Authentication middleware that validates JWT tokens.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - 401 `missing_token` if no usable bearer credential is present
/// - 401 `invalid_token` for every validation failure
/// - Otherwise continues to the next handler with
///   `AuthenticatedIdentity<D::Claims>` in extensions
#[instrument(skip_all, name = "api.middleware.auth")]
pub async fn require_auth<D: ClaimsDecoder>(
    State(state): State<Arc<AuthState<D>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let result = match extract_bearer(req.headers()).map(str::to_owned) {
        Ok(token) => state.jwt_validator.validate(&token).await,
        Err(e) => Err(e),
    };

    let identity = match result {
        Ok(identity) => identity,
        Err(e) => {
            log_rejection(&e);
            record_auth_outcome(e.reason());
            return Err(e);
        }
    };

    record_auth_outcome("success");
    tracing::debug!(target: "api.middleware.auth", "Request authenticated");

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

fn log_rejection(error: &AuthError) {
    match error {
        // Operational failure, not a client problem
        AuthError::KeySourceUnavailable(detail) => {
            tracing::error!(
                target: "api.auth.jwks",
                reason = error.reason(),
                error = %detail,
                "Rejecting request: signing keys unavailable"
            );
        }
        _ => {
            tracing::info!(
                target: "api.middleware.auth",
                reason = error.reason(),
                error = %error,
                "Rejecting unauthenticated request"
            );
        }
    }
}

/// Extension trait for extracting the identity from a request.
pub trait IdentityExt {
    /// Get the authenticated identity from request extensions.
    ///
    /// Returns `None` if the gate was not applied to this request.
    fn identity<C: Clone + Send + Sync + 'static>(&self) -> Option<&AuthenticatedIdentity<C>>;
}

impl<B> IdentityExt for axum::http::Request<B> {
    fn identity<C: Clone + Send + Sync + 'static>(&self) -> Option<&AuthenticatedIdentity<C>> {
        self.extensions().get::<AuthenticatedIdentity<C>>()
    }
}
