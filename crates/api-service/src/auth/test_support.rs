//! Signing fixtures shared by unit tests in this crate.
//!
//! Integration tests use `api-test-utils` instead.

#![allow(clippy::unwrap_used)]

use crate::auth::claims::ProfileClaimsDecoder;
use crate::auth::jwks::{Jwk, JwkSet, KeyResolver, KeySource, KeySourceError};
use crate::auth::jwt::{JwtValidator, ValidationPolicy};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const ISSUER: &str = "https://example-authority/";
pub const AUDIENCE: &str = "api-audience";

/// Build PKCS#8 v1 document from Ed25519 seed.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = vec![
        0x30, 0x2e, // SEQUENCE, 46 bytes
        0x02, 0x01, 0x00, // version 0
        0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112
        0x04, 0x22, 0x04, 0x20, // OCTET STRING { OCTET STRING (32) }
    ];
    pkcs8.extend_from_slice(seed);
    pkcs8
}

/// Deterministic Ed25519 key with a key id.
pub struct TestKey {
    pub kid: String,
    public_key: Vec<u8>,
    pkcs8: Vec<u8>,
}

impl TestKey {
    pub fn new(seed: u8, kid: &str) -> Self {
        let seed_bytes = [seed; 32];
        let pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes).unwrap();
        Self {
            kid: kid.to_string(),
            public_key: pair.public_key().as_ref().to_vec(),
            pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    pub fn jwk(&self) -> Jwk {
        Jwk {
            kty: "OKP".to_string(),
            kid: Some(self.kid.clone()),
            alg: Some("EdDSA".to_string()),
            key_use: Some("sig".to_string()),
            crv: Some("Ed25519".to_string()),
            x: Some(URL_SAFE_NO_PAD.encode(&self.public_key)),
            y: None,
            n: None,
            e: None,
        }
    }

    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.kid.clone());
        encode(&header, claims, &EncodingKey::from_ed_der(&self.pkcs8)).unwrap()
    }
}

/// Key source that always returns the same keys.
pub struct StaticSource(pub Vec<Jwk>);

#[async_trait]
impl KeySource for StaticSource {
    async fn fetch(&self) -> Result<JwkSet, KeySourceError> {
        Ok(JwkSet {
            keys: self.0.clone(),
        })
    }
}

pub fn policy(skew: Duration) -> ValidationPolicy {
    ValidationPolicy {
        issuer: ISSUER.to_string(),
        audience: AUDIENCE.to_string(),
        allowed_algorithms: vec![Algorithm::EdDSA],
        clock_skew: skew,
    }
}

/// Validator over a static key source publishing `keys`.
pub fn validator_for(keys: &[&TestKey], skew: Duration) -> JwtValidator<ProfileClaimsDecoder> {
    let source = StaticSource(keys.iter().map(|k| k.jwk()).collect());
    JwtValidator::new(
        KeyResolver::new(Arc::new(source)),
        ProfileClaimsDecoder::new(),
        policy(skew),
    )
}

/// Claims that pass every check at `now`.
pub fn claims_valid_at(now: i64) -> serde_json::Value {
    json!({
        "iss": ISSUER,
        "sub": "auth0|user-1",
        "aud": [AUDIENCE],
        "exp": now + 3600,
        "iat": now,
        "email": "a@b.com",
        "name": "Ada"
    })
}
