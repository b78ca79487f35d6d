//! JWT validation for protected routes.
//!
//! Validates incoming JWTs using public keys from the authority's JWKS.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The header's `alg` must be in the configured allow-list before any key
//!   lookup happens, and must fit the resolved key (no algorithm substitution)
//! - Issuer, audience, expiry, not-before and issued-at are checked after
//!   the signature, with clock skew tolerance
//! - Errors carry the precise reason for logging; the gate decides what the
//!   client sees

use crate::auth::claims::{AuthenticatedIdentity, ClaimsDecoder, RegisteredClaims};
use crate::auth::jwks::{KeyResolver, SigningKey};
use crate::errors::{AuthError, ClaimViolation};
use common::jwt::{check_time_window, now_unix, peek_header, JwtValidationError};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

/// What a token must satisfy besides a valid signature.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    /// Exact expected `iss`.
    pub issuer: String,

    /// Value that must appear in `aud`.
    pub audience: String,

    /// Algorithms a token may declare.
    pub allowed_algorithms: Vec<Algorithm>,

    /// Clock skew tolerance for `exp`, `nbf` and `iat`.
    pub clock_skew: Duration,
}

/// JWT validator using keys from a [`KeyResolver`].
pub struct JwtValidator<D: ClaimsDecoder> {
    /// Key resolver with the JWKS cache.
    resolver: KeyResolver,

    /// Decoder for deployment-specific claims.
    decoder: D,

    policy: ValidationPolicy,
}

impl<D: ClaimsDecoder> JwtValidator<D> {
    /// Create a new JWT validator.
    pub fn new(resolver: KeyResolver, decoder: D, policy: ValidationPolicy) -> Self {
        Self {
            resolver,
            decoder,
            policy,
        }
    }

    /// The policy this validator enforces.
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// The key resolver backing this validator.
    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    /// Validate a JWT against the current time.
    ///
    /// # Errors
    ///
    /// See [`JwtValidator::validate_at`].
    pub async fn validate(&self, token: &str) -> Result<AuthenticatedIdentity<D::Claims>, AuthError> {
        self.validate_at(token, now_unix()).await
    }

    /// Validate a JWT against an explicit `now` (Unix epoch seconds).
    ///
    /// # Checks
    ///
    /// 1. Size and header structure, `alg` in the allow-list
    /// 2. Resolve the key by `kid`
    /// 3. Verify the signature with the header's algorithm
    /// 4. Issuer, audience and time window
    /// 5. Decode custom claims
    ///
    /// # Errors
    ///
    /// - `MalformedToken` - oversized or structurally invalid token
    /// - `AlgorithmNotAllowed` - `alg` outside the allow-list or unfit for the key
    /// - `UnknownKey` / `KeySourceUnavailable` - from the resolver
    /// - `InvalidSignature` - signature does not verify
    /// - `ClaimValidationFailed` - registered claim violated
    /// - `MalformedClaims` - payload does not decode
    #[instrument(skip_all)]
    pub async fn validate_at(
        &self,
        token: &str,
        now: i64,
    ) -> Result<AuthenticatedIdentity<D::Claims>, AuthError> {
        // 1. Header inspection (includes size check via common::jwt)
        let header = peek_header(token).map_err(|e| {
            tracing::debug!(target: "api.auth.jwt", error = ?e, "Token header inspection failed");
            match e {
                JwtValidationError::MissingAlgorithm => {
                    AuthError::AlgorithmNotAllowed("<missing>".to_string())
                }
                _ => AuthError::MalformedToken,
            }
        })?;

        let algorithm = self.allowed_algorithm(&header.alg)?;

        // 2. Resolve the signing key
        let key = self.resolver.resolve(&header.kid).await?;

        // 3. Verify signature
        let payload = verify_signature(token, &key, algorithm)?;

        // 4. Registered claims
        let registered: RegisteredClaims = serde_json::from_value(payload.clone()).map_err(|e| {
            tracing::debug!(target: "api.auth.jwt", error = %e, "Registered claims malformed");
            AuthError::MalformedClaims(format!("registered claims: {e}"))
        })?;
        self.check_registered(&registered, now)?;

        // 5. Custom claims
        let custom = self.decoder.decode(&payload).map_err(|e| {
            tracing::debug!(target: "api.auth.jwt", error = %e, "Custom claims decode failed");
            AuthError::MalformedClaims(e.to_string())
        })?;

        tracing::debug!(target: "api.auth.jwt", kid = %header.kid, "Token validated successfully");
        Ok(AuthenticatedIdentity { registered, custom })
    }

    fn allowed_algorithm(&self, declared: &str) -> Result<Algorithm, AuthError> {
        Algorithm::from_str(declared)
            .ok()
            .filter(|alg| self.policy.allowed_algorithms.contains(alg))
            .ok_or_else(|| {
                tracing::debug!(target: "api.auth.jwt", alg = %declared, "Token algorithm not allowed");
                AuthError::AlgorithmNotAllowed(declared.to_string())
            })
    }

    fn check_registered(&self, claims: &RegisteredClaims, now: i64) -> Result<(), AuthError> {
        if claims.iss.as_deref() != Some(self.policy.issuer.as_str()) {
            tracing::debug!(target: "api.auth.jwt", iss = ?claims.iss, "Token issuer mismatch");
            return Err(ClaimViolation::WrongIssuer.into());
        }

        if !claims.has_audience(&self.policy.audience) {
            tracing::debug!(target: "api.auth.jwt", aud = ?claims.aud, "Token audience mismatch");
            return Err(ClaimViolation::WrongAudience.into());
        }

        let exp = claims.exp.ok_or(ClaimViolation::MissingExpiry)?;
        check_time_window(exp, claims.nbf, claims.iat, self.policy.clock_skew, now)
            .map_err(|v| AuthError::ClaimValidationFailed(v.into()))
    }
}

/// Verify the signature and return the raw claims payload.
///
/// Registered-claim checks are disabled here; they run afterwards so that
/// each violation gets its own reason.
fn verify_signature(
    token: &str,
    key: &SigningKey,
    algorithm: Algorithm,
) -> Result<serde_json::Value, AuthError> {
    if !key.supports(algorithm) {
        tracing::warn!(
            target: "api.auth.jwt",
            kid = %key.kid(),
            alg = ?algorithm,
            key_alg = ?key.algorithm(),
            "Token algorithm does not fit the signing key"
        );
        return Err(AuthError::AlgorithmNotAllowed(format!("{algorithm:?}")));
    }

    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    validation.leeway = 0;

    let token_data =
        decode::<serde_json::Value>(token, key.decoding_key(), &validation).map_err(|e| {
            tracing::debug!(target: "api.auth.jwt", error = %e, "Token verification failed");
            match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidRsaKey(_)
                | ErrorKind::InvalidEcdsaKey
                | ErrorKind::InvalidKeyFormat
                | ErrorKind::Crypto(_) => AuthError::InvalidSignature,
                ErrorKind::InvalidAlgorithm => {
                    AuthError::AlgorithmNotAllowed(format!("{algorithm:?}"))
                }
                _ => AuthError::MalformedToken,
            }
        })?;

    if !token_data.claims.is_object() {
        return Err(AuthError::MalformedClaims(
            "claims payload is not a JSON object".to_string(),
        ));
    }

    Ok(token_data.claims)
}
