//! Claims carried by validated tokens.
//!
//! Registered claims (issuer, subject, audience, time window) have a fixed
//! shape. Everything else is deployment-specific and decoded through a
//! [`ClaimsDecoder`], so different deployments can carry different identity
//! fields without touching the validator. The `sub` field is redacted in
//! Debug output to prevent exposure in logs.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

/// Registered JWT claims (RFC 7519 §4.1) used by the gate.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegisteredClaims {
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Subject (user or client id) - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Audience. A single string on the wire is normalised to a list.
    #[serde(default, deserialize_with = "one_or_many")]
    pub aud: Vec<String>,

    /// Expiration timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl fmt::Debug for RegisteredClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredClaims")
            .field("iss", &self.iss)
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iat", &self.iat)
            .finish()
    }
}

impl RegisteredClaims {
    /// Whether the audience list contains `audience`.
    pub fn has_audience(&self, audience: &str) -> bool {
        self.aud.iter().any(|a| a == audience)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(OneOrMany::One(aud)) => Ok(vec![aud]),
        Some(OneOrMany::Many(auds)) => Ok(auds),
    }
}

/// Failure to decode deployment-specific claims.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ClaimsDecodeError(pub String);

impl ClaimsDecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Decodes a verified claims payload into a typed identity.
///
/// Only called after the signature and registered claims have been checked.
pub trait ClaimsDecoder: Send + Sync + 'static {
    /// Typed custom claims.
    type Claims: Clone + Send + Sync + 'static;

    /// Decode the full claims payload.
    fn decode(&self, payload: &serde_json::Value) -> Result<Self::Claims, ClaimsDecodeError>;
}

/// Custom claims with an optional semantic check run after decoding.
pub trait CustomClaims: DeserializeOwned + Clone + Send + Sync + 'static {
    /// Reject decoded claims that are structurally valid but unacceptable.
    fn validate(&self) -> Result<(), ClaimsDecodeError> {
        Ok(())
    }
}

/// [`ClaimsDecoder`] for any serde type implementing [`CustomClaims`].
pub struct JsonClaimsDecoder<T> {
    _claims: PhantomData<fn() -> T>,
}

impl<T> JsonClaimsDecoder<T> {
    pub fn new() -> Self {
        Self {
            _claims: PhantomData,
        }
    }
}

impl<T> Default for JsonClaimsDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CustomClaims> ClaimsDecoder for JsonClaimsDecoder<T> {
    type Claims = T;

    fn decode(&self, payload: &serde_json::Value) -> Result<T, ClaimsDecodeError> {
        let claims = T::deserialize(payload).map_err(|e| ClaimsDecodeError::new(e.to_string()))?;
        claims.validate()?;
        Ok(claims)
    }
}

/// Profile claims carried by the authority's access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileClaims {
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub name: String,
}

impl CustomClaims for ProfileClaims {}

/// Decoder used by the service binary.
pub type ProfileClaimsDecoder = JsonClaimsDecoder<ProfileClaims>;

/// Validated identity attached to a request.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity<C> {
    /// Registered claims.
    pub registered: RegisteredClaims,

    /// Deployment-specific claims.
    pub custom: C,
}

impl<C: fmt::Debug> fmt::Debug for AuthenticatedIdentity<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedIdentity")
            .field("registered", &self.registered)
            .field("custom", &self.custom)
            .finish()
    }
}

impl<C> AuthenticatedIdentity<C> {
    /// Subject of the token.
    pub fn subject(&self) -> Option<&str> {
        self.registered.sub.as_deref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registered_claims_audience_string() {
        let claims: RegisteredClaims =
            serde_json::from_value(json!({"aud": "api-audience", "exp": 1})).unwrap();
        assert_eq!(claims.aud, vec!["api-audience".to_string()]);
        assert!(claims.has_audience("api-audience"));
    }

    #[test]
    fn test_registered_claims_audience_array() {
        let claims: RegisteredClaims = serde_json::from_value(json!({
            "aud": ["api-audience", "https://example-authority/userinfo"]
        }))
        .unwrap();
        assert_eq!(claims.aud.len(), 2);
        assert!(claims.has_audience("https://example-authority/userinfo"));
        assert!(!claims.has_audience("api"));
    }

    #[test]
    fn test_registered_claims_missing_and_null_audience() {
        let claims: RegisteredClaims = serde_json::from_value(json!({})).unwrap();
        assert!(claims.aud.is_empty());

        let claims: RegisteredClaims = serde_json::from_value(json!({"aud": null})).unwrap();
        assert!(claims.aud.is_empty());
    }

    #[test]
    fn test_registered_claims_reject_wrong_types() {
        assert!(serde_json::from_value::<RegisteredClaims>(json!({"exp": "soon"})).is_err());
        assert!(serde_json::from_value::<RegisteredClaims>(json!({"aud": 42})).is_err());
    }

    #[test]
    fn test_registered_claims_debug_redacts_sub() {
        let claims = RegisteredClaims {
            sub: Some("auth0|secret-user-id".to_string()),
            ..Default::default()
        };

        let debug_str = format!("{:?}", claims);
        assert!(!debug_str.contains("secret-user-id"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_profile_decoder() {
        let decoder = ProfileClaimsDecoder::new();
        let claims = decoder
            .decode(&json!({"sub": "u", "email": "a@b.com", "name": "Ada"}))
            .unwrap();

        assert_eq!(claims.email, "a@b.com");
        assert_eq!(claims.name, "Ada");
    }

    #[test]
    fn test_profile_decoder_defaults_missing_fields() {
        let claims = ProfileClaimsDecoder::new().decode(&json!({"sub": "u"})).unwrap();
        assert_eq!(claims, ProfileClaims::default());
    }

    #[test]
    fn test_profile_decoder_rejects_wrong_types() {
        let result = ProfileClaimsDecoder::new().decode(&json!({"email": 42}));
        assert!(result.is_err());
    }

    #[derive(Debug, Clone, Deserialize)]
    struct TenantClaims {
        tenant: String,
    }

    impl CustomClaims for TenantClaims {
        fn validate(&self) -> Result<(), ClaimsDecodeError> {
            if self.tenant.is_empty() {
                return Err(ClaimsDecodeError::new("tenant must not be empty"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_custom_claims_validate_hook() {
        let decoder = JsonClaimsDecoder::<TenantClaims>::new();

        assert_eq!(decoder.decode(&json!({"tenant": "acme"})).unwrap().tenant, "acme");
        let err = decoder.decode(&json!({"tenant": ""})).unwrap_err();
        assert_eq!(err.to_string(), "tenant must not be empty");
        assert!(decoder.decode(&json!({})).is_err());
    }

    #[test]
    fn test_identity_debug_redacts_subject() {
        let identity = AuthenticatedIdentity {
            registered: RegisteredClaims {
                sub: Some("secret-user".to_string()),
                ..Default::default()
            },
            custom: ProfileClaims::default(),
        };

        assert_eq!(identity.subject(), Some("secret-user"));
        assert!(!format!("{:?}", identity).contains("secret-user"));
    }
}
