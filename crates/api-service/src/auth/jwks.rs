//! Key resolver: fetches and caches the authority's public signing keys.
//!
//! The resolver pulls the full JSON Web Key Set from the authority's
//! `/.well-known/jwks.json` endpoint (through a [`KeySource`]) and caches it
//! with a configurable TTL.
//!
//! # Concurrency
//!
//! - Cache reads are lock-free (`ArcSwapOption`); a hit never waits
//! - Cache misses are single-flight: one caller fetches, every other caller
//!   that missed the same generation waits on the refresh lock and then
//!   re-reads the cache (success and failure are both shared)
//! - The fetch runs on its own task, so a cancelled request does not abort
//!   a refresh other requests are waiting on
//!
//! # Degraded fallback
//!
//! With `stale_fallback` > 0, an expired key set keeps being served for up
//! to that long past its expiry while the key source is failing. With the
//! default of zero the resolver fails closed as soon as the TTL lapses and a
//! refresh fails.

use crate::errors::AuthError;
use crate::observability::metrics;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use common::jwt::decode_ed25519_public_key_jwk;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;

/// Default cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Timeout for a single JWKS HTTP request.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Length of a raw Ed25519 public key.
const ED25519_PUBLIC_KEY_LEN: usize = 32;

// =============================================================================
// Wire types
// =============================================================================

/// JSON Web Key as published by the authority.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type: `RSA`, `EC` or `OKP`.
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is meant for.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Curve name for EC/OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwkSet {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

// =============================================================================
// Key source
// =============================================================================

/// Failure to obtain a key set from a [`KeySource`].
#[derive(Debug, Error)]
pub enum KeySourceError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("endpoint returned status {0}")]
    Status(u16),

    #[error("malformed key set: {0}")]
    Malformed(String),
}

/// Where the resolver gets its key sets from.
///
/// Production uses [`HttpKeySource`]; tests inject in-memory sources.
#[async_trait]
pub trait KeySource: Send + Sync + 'static {
    /// Fetch the complete, current key set.
    async fn fetch(&self) -> Result<JwkSet, KeySourceError>;
}

/// Fetches a JWKS document over HTTP(S).
pub struct HttpKeySource {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,
}

impl HttpKeySource {
    /// Create a key source for the given JWKS URL.
    pub fn new(jwks_url: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "api.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
        }
    }

    /// The endpoint this source reads from.
    pub fn url(&self) -> &str {
        &self.jwks_url
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch(&self) -> Result<JwkSet, KeySourceError> {
        tracing::debug!(target: "api.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| KeySourceError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeySourceError::Status(response.status().as_u16()));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| KeySourceError::Malformed(e.to_string()))
    }
}

// =============================================================================
// Signing keys
// =============================================================================

/// Key family, used to check that a token's algorithm fits the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    Ec,
    Okp,
}

impl KeyFamily {
    /// Family required by an algorithm. `None` for symmetric algorithms,
    /// which can never be verified with a published key.
    pub fn of(alg: Algorithm) -> Option<Self> {
        match alg {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Some(KeyFamily::Rsa),
            Algorithm::ES256 | Algorithm::ES384 => Some(KeyFamily::Ec),
            Algorithm::EdDSA => Some(KeyFamily::Okp),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => None,
        }
    }
}

/// A public verification key from the current key set. Immutable.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: Option<Algorithm>,
    family: KeyFamily,
    decoding_key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Build a verification key from a published JWK.
    ///
    /// # Errors
    ///
    /// Returns a description of why the JWK cannot be used for signature
    /// verification (missing kid, non-signing use, unsupported type or
    /// algorithm, bad key material).
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, String> {
        let kid = jwk
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| "JWK has no kid".to_string())?
            .to_string();

        if let Some(key_use) = &jwk.key_use {
            if key_use != "sig" {
                return Err(format!("JWK use '{key_use}' is not 'sig'"));
            }
        }

        let algorithm = match &jwk.alg {
            Some(alg) => Some(
                Algorithm::from_str(alg).map_err(|_| format!("unsupported JWK alg '{alg}'"))?,
            ),
            None => None,
        };

        let (family, decoding_key) = match jwk.kty.as_str() {
            "OKP" => {
                if let Some(crv) = &jwk.crv {
                    if crv != "Ed25519" {
                        return Err(format!("unsupported OKP curve '{crv}'"));
                    }
                }
                let x = jwk.x.as_deref().ok_or_else(|| "OKP JWK missing x".to_string())?;
                let public_key = decode_ed25519_public_key_jwk(x)
                    .map_err(|e| format!("invalid OKP public key encoding: {e}"))?;
                if public_key.len() != ED25519_PUBLIC_KEY_LEN {
                    return Err(format!(
                        "OKP public key must be {ED25519_PUBLIC_KEY_LEN} bytes, got {}",
                        public_key.len()
                    ));
                }
                (KeyFamily::Okp, DecodingKey::from_ed_der(&public_key))
            }
            "RSA" => {
                let n = jwk.n.as_deref().ok_or_else(|| "RSA JWK missing n".to_string())?;
                let e = jwk.e.as_deref().ok_or_else(|| "RSA JWK missing e".to_string())?;
                let key = DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| format!("invalid RSA components: {e}"))?;
                (KeyFamily::Rsa, key)
            }
            "EC" => {
                let x = jwk.x.as_deref().ok_or_else(|| "EC JWK missing x".to_string())?;
                let y = jwk.y.as_deref().ok_or_else(|| "EC JWK missing y".to_string())?;
                let key = DecodingKey::from_ec_components(x, y)
                    .map_err(|e| format!("invalid EC components: {e}"))?;
                (KeyFamily::Ec, key)
            }
            other => return Err(format!("unsupported key type '{other}'")),
        };

        if let Some(alg) = algorithm {
            if KeyFamily::of(alg) != Some(family) {
                return Err(format!("JWK alg {alg:?} does not match key type {}", jwk.kty));
            }
        }

        Ok(Self {
            kid,
            algorithm,
            family,
            decoding_key,
        })
    }

    /// Key identifier.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm declared by the JWK, if any.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Key family.
    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// Key material for `jsonwebtoken`.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Whether a token signed with `alg` may be verified with this key.
    pub fn supports(&self, alg: Algorithm) -> bool {
        KeyFamily::of(alg) == Some(self.family) && self.algorithm.map_or(true, |own| own == alg)
    }
}

/// Mapping from key identifier to signing key.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
}

impl KeySet {
    /// Build a key set, skipping keys that cannot be used for verification.
    pub fn from_jwks(jwks: JwkSet) -> Self {
        let mut keys = HashMap::with_capacity(jwks.keys.len());

        for jwk in &jwks.keys {
            match SigningKey::from_jwk(jwk) {
                Ok(key) => {
                    if keys.contains_key(key.kid()) {
                        tracing::warn!(target: "api.auth.jwks", kid = %key.kid(), "Duplicate kid in JWKS, keeping first");
                        continue;
                    }
                    keys.insert(key.kid().to_string(), Arc::new(key));
                }
                Err(reason) => {
                    tracing::warn!(
                        target: "api.auth.jwks",
                        kid = ?jwk.kid,
                        reason = %reason,
                        "Skipping unusable JWK"
                    );
                }
            }
        }

        Self { keys }
    }

    /// Look up a key by identifier.
    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Cached key set with expiry time.
struct CachedKeySet {
    keys: Arc<KeySet>,
    expires_at: Instant,
}

struct ResolverInner {
    source: Arc<dyn KeySource>,

    /// Current key set; `None` until the first successful fetch.
    cache: ArcSwapOption<CachedKeySet>,

    /// Serialises refreshes (single-flight).
    refresh_lock: Arc<Mutex<()>>,

    /// Number of completed fetch attempts, successful or not.
    attempts: AtomicU64,

    cache_ttl: Duration,
    stale_fallback: Duration,
}

/// Resolves key identifiers to signing keys, backed by a TTL cache.
///
/// Cheap to clone; clones share one cache. The cache lives as long as the
/// resolver, so each test (or each process) gets its own.
#[derive(Clone)]
pub struct KeyResolver {
    inner: Arc<ResolverInner>,
}

impl KeyResolver {
    /// Create a resolver with the default TTL and no stale fallback.
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        Self::with_ttl(source, DEFAULT_CACHE_TTL)
    }

    /// Create a resolver with a custom TTL and no stale fallback.
    pub fn with_ttl(source: Arc<dyn KeySource>, cache_ttl: Duration) -> Self {
        Self::with_stale_fallback(source, cache_ttl, Duration::ZERO)
    }

    /// Create a resolver that may serve an expired key set for up to
    /// `stale_fallback` past its expiry while the key source is failing.
    pub fn with_stale_fallback(
        source: Arc<dyn KeySource>,
        cache_ttl: Duration,
        stale_fallback: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                source,
                cache: ArcSwapOption::const_empty(),
                refresh_lock: Arc::new(Mutex::new(())),
                attempts: AtomicU64::new(0),
                cache_ttl,
                stale_fallback,
            }),
        }
    }

    /// Resolve a key identifier to a signing key.
    ///
    /// Served from cache while it is fresh; otherwise the key set is
    /// refreshed (single-flight) first.
    ///
    /// # Errors
    ///
    /// - `AuthError::UnknownKey` if the current key set has no such kid
    /// - `AuthError::KeySourceUnavailable` if no usable key set is available
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, AuthError> {
        if let Some(keys) = self.inner.fresh_keys() {
            tracing::debug!(target: "api.auth.jwks", kid = %kid, "JWKS cache hit");
            return lookup(&keys, kid);
        }

        let observed = self.inner.attempts.load(Ordering::Acquire);
        let guard = Arc::clone(&self.inner.refresh_lock).lock_owned().await;

        // Someone else refreshed while we waited: reuse their outcome.
        if self.inner.attempts.load(Ordering::Acquire) != observed
            || self.inner.fresh_keys().is_some()
        {
            drop(guard);
            return self.inner.lookup_current(kid);
        }

        let inner = Arc::clone(&self.inner);
        let fetch = tokio::spawn(async move {
            let outcome = inner.refresh().await;
            inner.attempts.fetch_add(1, Ordering::Release);
            drop(guard);
            outcome
        });

        match fetch.await {
            Ok(Ok(())) => self.inner.lookup_current(kid),
            Ok(Err(fetch_error)) => match self.inner.lookup_current(kid) {
                Err(AuthError::KeySourceUnavailable(_)) => Err(fetch_error),
                other => other,
            },
            Err(e) => {
                tracing::error!(target: "api.auth.jwks", error = %e, "JWKS refresh task failed");
                Err(AuthError::KeySourceUnavailable(
                    "key refresh task failed".to_string(),
                ))
            }
        }
    }

    /// Fetch a fresh key set now, regardless of cache state.
    ///
    /// Used to warm the cache at startup.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::KeySourceUnavailable` if the fetch fails. The
    /// previous key set (if any) is left in place.
    pub async fn force_refresh(&self) -> Result<(), AuthError> {
        let _guard = self.inner.refresh_lock.lock().await;
        let outcome = self.inner.refresh().await;
        self.inner.attempts.fetch_add(1, Ordering::Release);
        outcome
    }

    /// Number of keys in the current key set (fresh or stale).
    pub fn cached_key_count(&self) -> Option<usize> {
        self.inner.cache.load().as_ref().map(|cached| cached.keys.len())
    }

    /// Number of completed fetch attempts.
    pub fn fetch_attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::Acquire)
    }

    /// Configured cache TTL.
    pub fn cache_ttl(&self) -> Duration {
        self.inner.cache_ttl
    }
}

impl ResolverInner {
    fn fresh_keys(&self) -> Option<Arc<KeySet>> {
        let cached = self.cache.load();
        cached
            .as_ref()
            .filter(|cached| cached.expires_at > Instant::now())
            .map(|cached| Arc::clone(&cached.keys))
    }

    /// Look up a kid in whatever key set is currently usable.
    fn lookup_current(&self, kid: &str) -> Result<Arc<SigningKey>, AuthError> {
        let cached = self.cache.load();
        let Some(cached) = cached.as_ref() else {
            return Err(AuthError::KeySourceUnavailable(
                "no key set available".to_string(),
            ));
        };

        let now = Instant::now();
        if cached.expires_at > now {
            return lookup(&cached.keys, kid);
        }

        let stale_for = now.saturating_duration_since(cached.expires_at);
        if stale_for < self.stale_fallback {
            tracing::warn!(
                target: "api.auth.jwks",
                kid = %kid,
                stale_secs = stale_for.as_secs(),
                "Serving stale JWKS while key source is unavailable"
            );
            return lookup(&cached.keys, kid);
        }

        Err(AuthError::KeySourceUnavailable(
            "key set expired and refresh failed".to_string(),
        ))
    }

    /// Fetch from the source and swap in the new key set.
    async fn refresh(&self) -> Result<(), AuthError> {
        let started = Instant::now();
        let result = self.source.fetch().await;
        let elapsed = started.elapsed();

        match result {
            Ok(jwks) => {
                let keys = KeySet::from_jwks(jwks);
                metrics::record_jwks_fetch("success", elapsed);
                tracing::info!(
                    target: "api.auth.jwks",
                    key_count = keys.len(),
                    "JWKS cache refreshed"
                );
                if keys.is_empty() {
                    tracing::warn!(target: "api.auth.jwks", "JWKS contains no usable keys");
                }

                self.cache.store(Some(Arc::new(CachedKeySet {
                    keys: Arc::new(keys),
                    expires_at: Instant::now() + self.cache_ttl,
                })));
                Ok(())
            }
            Err(e) => {
                metrics::record_jwks_fetch("error", elapsed);
                tracing::error!(target: "api.auth.jwks", error = %e, "Failed to fetch JWKS");
                Err(AuthError::KeySourceUnavailable(e.to_string()))
            }
        }
    }
}

fn lookup(keys: &KeySet, kid: &str) -> Result<Arc<SigningKey>, AuthError> {
    keys.get(kid).ok_or_else(|| {
        tracing::debug!(target: "api.auth.jwks", kid = %kid, "Key not found in JWKS");
        AuthError::UnknownKey(kid.to_string())
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    fn okp_jwk(kid: &str) -> Jwk {
        Jwk {
            kty: "OKP".to_string(),
            kid: Some(kid.to_string()),
            alg: Some("EdDSA".to_string()),
            key_use: Some("sig".to_string()),
            crv: Some("Ed25519".to_string()),
            x: Some(URL_SAFE_NO_PAD.encode([9u8; 32])),
            y: None,
            n: None,
            e: None,
        }
    }

    /// In-memory key source that counts fetches.
    struct CountingSource {
        response: StdMutex<Result<Vec<String>, ()>>,
        fetches: AtomicUsize,
        delay: Duration,
    }

    impl CountingSource {
        fn serving(kids: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                response: StdMutex::new(Ok(kids.iter().map(|k| k.to_string()).collect())),
                fetches: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(kids: &[&str], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                response: StdMutex::new(Ok(kids.iter().map(|k| k.to_string()).collect())),
                fetches: AtomicUsize::new(0),
                delay,
            })
        }

        fn set_kids(&self, kids: &[&str]) {
            *self.response.lock().unwrap() = Ok(kids.iter().map(|k| k.to_string()).collect());
        }

        fn fail(&self) {
            *self.response.lock().unwrap() = Err(());
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KeySource for CountingSource {
        async fn fetch(&self) -> Result<JwkSet, KeySourceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let response = self.response.lock().unwrap().clone();
            match response {
                Ok(kids) => Ok(JwkSet {
                    keys: kids.iter().map(|kid| okp_jwk(kid)).collect(),
                }),
                Err(()) => Err(KeySourceError::Request("connection refused".to_string())),
            }
        }
    }

    // =========================================================================
    // JWK parsing
    // =========================================================================

    #[test]
    fn test_jwk_deserialization() {
        let json = r#"{
            "kty": "RSA",
            "kid": "rsa-key-01",
            "alg": "RS256",
            "use": "sig",
            "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw",
            "e": "AQAB"
        }"#;

        let jwk: Jwk = serde_json::from_str(json).unwrap();

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.kid.as_deref(), Some("rsa-key-01"));
        assert_eq!(jwk.alg.as_deref(), Some("RS256"));
        assert_eq!(jwk.key_use.as_deref(), Some("sig"));
        assert_eq!(jwk.e.as_deref(), Some("AQAB"));
        assert!(jwk.x.is_none());
    }

    #[test]
    fn test_jwk_deserialization_minimal() {
        let jwk: Jwk = serde_json::from_str(r#"{"kty": "OKP"}"#).unwrap();

        assert_eq!(jwk.kty, "OKP");
        assert!(jwk.kid.is_none());
        assert!(jwk.alg.is_none());
        assert!(jwk.key_use.is_none());
    }

    #[test]
    fn test_jwks_deserialization_ignores_unknown_fields() {
        let json = r#"{
            "keys": [
                {"kty": "OKP", "kid": "key-1", "x5c": ["abc"]},
                {"kty": "RSA", "kid": "key-2", "x5t": "def"}
            ]
        }"#;

        let jwks: JwkSet = serde_json::from_str(json).unwrap();
        assert_eq!(jwks.keys.len(), 2);
        assert_eq!(jwks.keys[1].kid.as_deref(), Some("key-2"));
    }

    #[test]
    fn test_signing_key_from_okp_jwk() {
        let key = SigningKey::from_jwk(&okp_jwk("ed-key")).unwrap();

        assert_eq!(key.kid(), "ed-key");
        assert_eq!(key.algorithm(), Some(Algorithm::EdDSA));
        assert_eq!(key.family(), KeyFamily::Okp);
        assert!(key.supports(Algorithm::EdDSA));
        assert!(!key.supports(Algorithm::RS256));
        assert!(!key.supports(Algorithm::HS256));
    }

    #[test]
    fn test_signing_key_from_rsa_jwk() {
        let jwk = Jwk {
            kty: "RSA".to_string(),
            kid: Some("rsa".to_string()),
            alg: None,
            key_use: None,
            crv: None,
            x: None,
            y: None,
            n: Some(URL_SAFE_NO_PAD.encode([0xABu8; 256])),
            e: Some("AQAB".to_string()),
        };

        let key = SigningKey::from_jwk(&jwk).unwrap();
        assert_eq!(key.family(), KeyFamily::Rsa);
        // Without a declared alg any RSA algorithm is acceptable
        assert!(key.supports(Algorithm::RS256));
        assert!(key.supports(Algorithm::PS512));
        assert!(!key.supports(Algorithm::EdDSA));
    }

    #[test]
    fn test_signing_key_declared_alg_restricts_support() {
        let mut jwk = okp_jwk("k");
        jwk.kty = "RSA".to_string();
        jwk.n = Some(URL_SAFE_NO_PAD.encode([0xABu8; 256]));
        jwk.e = Some("AQAB".to_string());
        jwk.alg = Some("RS384".to_string());

        let key = SigningKey::from_jwk(&jwk).unwrap();
        assert!(key.supports(Algorithm::RS384));
        assert!(!key.supports(Algorithm::RS256));
    }

    #[test]
    fn test_signing_key_rejects_unusable_jwks() {
        let mut missing_kid = okp_jwk("k");
        missing_kid.kid = None;
        assert!(SigningKey::from_jwk(&missing_kid).is_err());

        let mut empty_kid = okp_jwk("k");
        empty_kid.kid = Some(String::new());
        assert!(SigningKey::from_jwk(&empty_kid).is_err());

        let mut encryption_key = okp_jwk("k");
        encryption_key.key_use = Some("enc".to_string());
        assert!(SigningKey::from_jwk(&encryption_key).is_err());

        let mut wrong_curve = okp_jwk("k");
        wrong_curve.crv = Some("X25519".to_string());
        assert!(SigningKey::from_jwk(&wrong_curve).is_err());

        let mut missing_x = okp_jwk("k");
        missing_x.x = None;
        assert!(SigningKey::from_jwk(&missing_x).is_err());

        let mut bad_base64 = okp_jwk("k");
        bad_base64.x = Some("!!!invalid-base64!!!".to_string());
        assert!(SigningKey::from_jwk(&bad_base64).is_err());

        let mut short_key = okp_jwk("k");
        short_key.x = Some(URL_SAFE_NO_PAD.encode([1u8; 16]));
        assert!(SigningKey::from_jwk(&short_key).is_err());

        let mut mismatched_alg = okp_jwk("k");
        mismatched_alg.alg = Some("RS256".to_string());
        assert!(SigningKey::from_jwk(&mismatched_alg).is_err());

        let mut symmetric = okp_jwk("k");
        symmetric.alg = Some("HS256".to_string());
        assert!(SigningKey::from_jwk(&symmetric).is_err());

        let mut unknown_alg = okp_jwk("k");
        unknown_alg.alg = Some("none".to_string());
        assert!(SigningKey::from_jwk(&unknown_alg).is_err());

        let mut oct = okp_jwk("k");
        oct.kty = "oct".to_string();
        assert!(SigningKey::from_jwk(&oct).is_err());
    }

    #[test]
    fn test_key_set_skips_bad_keys_and_duplicates() {
        let mut bad = okp_jwk("bad");
        bad.x = None;
        let jwks = JwkSet {
            keys: vec![okp_jwk("a"), bad, okp_jwk("b"), okp_jwk("a")],
        };

        let keys = KeySet::from_jwks(jwks);
        assert_eq!(keys.len(), 2);
        assert!(keys.get("a").is_some());
        assert!(keys.get("b").is_some());
        assert!(keys.get("bad").is_none());
    }

    #[test]
    fn test_key_family_of_algorithms() {
        assert_eq!(KeyFamily::of(Algorithm::RS256), Some(KeyFamily::Rsa));
        assert_eq!(KeyFamily::of(Algorithm::PS256), Some(KeyFamily::Rsa));
        assert_eq!(KeyFamily::of(Algorithm::ES256), Some(KeyFamily::Ec));
        assert_eq!(KeyFamily::of(Algorithm::EdDSA), Some(KeyFamily::Okp));
        assert_eq!(KeyFamily::of(Algorithm::HS256), None);
    }

    // =========================================================================
    // Resolver
    // =========================================================================

    #[tokio::test]
    async fn test_resolve_fetches_once_and_caches() {
        let source = CountingSource::serving(&["key-1", "key-2"]);
        let resolver = KeyResolver::new(source.clone());

        let key = resolver.resolve("key-1").await.unwrap();
        assert_eq!(key.kid(), "key-1");
        let key = resolver.resolve("key-2").await.unwrap();
        assert_eq!(key.kid(), "key-2");
        let _ = resolver.resolve("key-1").await.unwrap();

        assert_eq!(source.fetches(), 1);
        assert_eq!(resolver.fetch_attempts(), 1);
        assert_eq!(resolver.cached_key_count(), Some(2));
    }

    #[tokio::test]
    async fn test_resolve_unknown_kid_in_fresh_cache() {
        let source = CountingSource::serving(&["key-1"]);
        let resolver = KeyResolver::new(source.clone());

        let err = resolver.resolve("rotated-away").await.unwrap_err();
        assert_eq!(err, AuthError::UnknownKey("rotated-away".to_string()));

        // Unknown kid does not trigger another fetch while the cache is fresh
        let err = resolver.resolve("rotated-away").await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownKey(_)));
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_resolve_picks_up_rotated_key_after_ttl() {
        let source = CountingSource::serving(&["old-key"]);
        let resolver = KeyResolver::with_ttl(source.clone(), Duration::from_millis(50));

        assert!(resolver.resolve("old-key").await.is_ok());
        assert!(matches!(
            resolver.resolve("new-key").await,
            Err(AuthError::UnknownKey(_))
        ));

        source.set_kids(&["new-key"]);
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(resolver.resolve("new-key").await.unwrap().kid(), "new-key");
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_force_refresh_picks_up_rotated_key() {
        let source = CountingSource::serving(&["old-key"]);
        let resolver = KeyResolver::new(source.clone());
        assert!(resolver.resolve("old-key").await.is_ok());

        source.set_kids(&["old-key", "new-key"]);
        resolver.force_refresh().await.unwrap();

        assert!(resolver.resolve("new-key").await.is_ok());
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_resolve_source_failure_without_cache() {
        let source = CountingSource::serving(&[]);
        source.fail();
        let resolver = KeyResolver::new(source.clone());

        let err = resolver.resolve("key-1").await.unwrap_err();
        assert!(matches!(err, AuthError::KeySourceUnavailable(_)), "{err:?}");
        assert_eq!(resolver.cached_key_count(), None);
    }

    #[tokio::test]
    async fn test_resolve_fails_closed_without_stale_fallback() {
        let source = CountingSource::serving(&["key-1"]);
        let resolver = KeyResolver::with_ttl(source.clone(), Duration::from_millis(30));
        assert!(resolver.resolve("key-1").await.is_ok());

        source.fail();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = resolver.resolve("key-1").await.unwrap_err();
        assert!(matches!(err, AuthError::KeySourceUnavailable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_resolve_serves_stale_keys_within_fallback_window() {
        let source = CountingSource::serving(&["key-1"]);
        let resolver = KeyResolver::with_stale_fallback(
            source.clone(),
            Duration::from_millis(30),
            Duration::from_secs(60),
        );
        assert!(resolver.resolve("key-1").await.is_ok());

        source.fail();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let key = resolver.resolve("key-1").await.unwrap();
        assert_eq!(key.kid(), "key-1");
        // Stale set still answers UnknownKey for kids it never had
        assert!(matches!(
            resolver.resolve("other").await,
            Err(AuthError::UnknownKey(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_rejects_after_fallback_window() {
        let source = CountingSource::serving(&["key-1"]);
        let resolver = KeyResolver::with_stale_fallback(
            source.clone(),
            Duration::from_millis(20),
            Duration::from_millis(30),
        );
        assert!(resolver.resolve("key-1").await.is_ok());

        source.fail();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let err = resolver.resolve("key-1").await.unwrap_err();
        assert!(matches!(err, AuthError::KeySourceUnavailable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_resolve_recovers_after_source_returns() {
        let source = CountingSource::serving(&["key-1"]);
        source.fail();
        let resolver = KeyResolver::new(source.clone());
        assert!(resolver.resolve("key-1").await.is_err());

        source.set_kids(&["key-1"]);
        assert!(resolver.resolve("key-1").await.is_ok());
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cold_misses_trigger_single_fetch() {
        let source = CountingSource::slow(&["key-1"], Duration::from_millis(100));
        let resolver = KeyResolver::new(source.clone());

        let tasks: Vec<_> = (0..100)
            .map(|i| {
                let resolver = resolver.clone();
                tokio::spawn(async move {
                    let kid = if i % 10 == 0 { "missing" } else { "key-1" };
                    resolver.resolve(kid).await
                })
            })
            .collect();

        let mut found = 0;
        let mut unknown = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => found += 1,
                Err(AuthError::UnknownKey(_)) => unknown += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(found, 90);
        assert_eq!(unknown, 10);
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_waiters_share_failed_fetch() {
        let source = CountingSource::slow(&[], Duration::from_millis(100));
        source.fail();
        let resolver = KeyResolver::new(source.clone());

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let resolver = resolver.clone();
                tokio::spawn(async move { resolver.resolve("key-1").await })
            })
            .collect();

        for task in tasks {
            let result = task.await.unwrap();
            assert!(matches!(result, Err(AuthError::KeySourceUnavailable(_))));
        }

        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_caller_does_not_abort_refresh() {
        let source = CountingSource::slow(&["key-1"], Duration::from_millis(100));
        let resolver = KeyResolver::new(source.clone());

        let cancelled = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve("key-1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancelled.abort();

        tokio::time::sleep(Duration::from_millis(150)).await;

        // The refresh finished on its own task and populated the cache
        assert_eq!(resolver.cached_key_count(), Some(1));
        assert!(resolver.resolve("key-1").await.is_ok());
        assert_eq!(source.fetches(), 1);
    }

    #[test]
    fn test_resolver_custom_ttl() {
        let resolver = KeyResolver::with_ttl(
            CountingSource::serving(&[]),
            Duration::from_secs(60),
        );
        assert_eq!(resolver.cache_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_http_key_source_creation() {
        let source = HttpKeySource::new(
            "https://example-authority/.well-known/jwks.json".to_string(),
        );
        assert_eq!(
            source.url(),
            "https://example-authority/.well-known/jwks.json"
        );
    }
}
