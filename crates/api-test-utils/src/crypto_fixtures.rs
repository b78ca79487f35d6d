//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs, their JWK form, and token
//! signing. All fixtures are deterministic based on seed values.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::json;
use thiserror::Error;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// Ed25519 keypair with a key id, usable both as a published JWK and as a
/// token signer.
#[derive(Clone)]
pub struct TestKeypair {
    pub kid: String,
    pub public_key: Vec<u8>,
    pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// Create a deterministic keypair.
    ///
    /// The same seed always produces the same keypair. Panics only if ring
    /// rejects the seed, which it does not for any 32-byte input.
    pub fn new(seed: u8, kid: &str) -> Self {
        Self::try_new(seed, kid).expect("deterministic Ed25519 seed is valid")
    }

    /// Fallible variant of [`TestKeypair::new`].
    pub fn try_new(seed: u8, kid: &str) -> Result<Self, FixtureError> {
        let seed_bytes = seed_bytes(seed);

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes).map_err(|e| {
            FixtureError::Crypto(format!("Failed to generate test keypair: {:?}", e))
        })?;

        Ok(Self {
            kid: kid.to_string(),
            public_key: key_pair.public_key().as_ref().to_vec(),
            pkcs8: build_pkcs8_from_seed(&seed_bytes),
        })
    }

    /// Public key as a JWK (`OKP` / `Ed25519` / `EdDSA`).
    pub fn jwk(&self) -> serde_json::Value {
        json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key),
            "alg": "EdDSA",
            "use": "sig"
        })
    }

    /// Sign `claims` as an EdDSA JWT with this key's kid.
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Sign `claims` with a caller-supplied header.
    pub fn sign_with_header(&self, header: &Header, claims: &serde_json::Value) -> String {
        encode(header, claims, &EncodingKey::from_ed_der(&self.pkcs8))
            .expect("signing with a valid Ed25519 key succeeds")
    }
}

/// JWKS document publishing `keys`.
pub fn jwks_document(keys: &[&TestKeypair]) -> serde_json::Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}

/// Assemble a compact JWS from raw parts without signing.
///
/// Used to build tokens a real signer would refuse to produce (HS256 or
/// `none` headers, garbage signatures).
pub fn raw_token(header: &serde_json::Value, claims: &serde_json::Value, signature: &str) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        signature
    )
}

fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    // Fill rest with deterministic pattern
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// Ring doesn't expose PKCS#8 for a seeded keypair, so we build it.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = Vec::with_capacity(48);

    // Outer SEQUENCE, 46 bytes
    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    // Version: INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    // AlgorithmIdentifier: SEQUENCE { OID 1.3.101.112 }
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    // Private key: OCTET STRING { OCTET STRING (32 bytes) }
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_is_deterministic() {
        let a = TestKeypair::new(1, "key-1");
        let b = TestKeypair::new(1, "key-1");

        assert_eq!(a.public_key, b.public_key);
        assert_eq!(a.jwk(), b.jwk());
    }

    #[test]
    fn test_different_seeds_produce_different_keys() {
        let a = TestKeypair::new(1, "key-1");
        let b = TestKeypair::new(2, "key-1");

        assert_ne!(a.public_key, b.public_key);
    }

    #[test]
    fn test_jwk_shape() {
        let jwk = TestKeypair::new(7, "kid-7").jwk();

        assert_eq!(jwk["kty"], "OKP");
        assert_eq!(jwk["kid"], "kid-7");
        assert_eq!(jwk["alg"], "EdDSA");
        let x = URL_SAFE_NO_PAD.decode(jwk["x"].as_str().unwrap()).unwrap();
        assert_eq!(x.len(), 32);
    }

    #[test]
    fn test_signed_token_has_kid() {
        let key = TestKeypair::new(1, "key-1");
        let token = key.sign(&json!({"sub": "alice"}));

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::EdDSA);
        assert_eq!(header.kid.as_deref(), Some("key-1"));
    }

    #[test]
    fn test_raw_token_layout() {
        let token = raw_token(&json!({"alg": "none"}), &json!({}), "");
        assert_eq!(token.split('.').count(), 3);
        assert!(token.ends_with('.'));
    }
}
