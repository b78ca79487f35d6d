//! Authentication module for the API service.
//!
//! Provides JWT validation using the identity authority's JWKS endpoint.
//!
//! # Components
//!
//! - `jwks` - Key source seam and single-flight key resolver with caching
//! - `jwt` - Signature and claims validation
//! - `claims` - Registered and deployment-specific claims
//! - `extractor` - Bearer credential extraction

pub mod claims;
pub mod extractor;
pub mod jwks;
pub mod jwt;

#[cfg(test)]
pub(crate) mod test_support;

pub use claims::{
    AuthenticatedIdentity, ClaimsDecodeError, ClaimsDecoder, CustomClaims, JsonClaimsDecoder,
    ProfileClaims, ProfileClaimsDecoder, RegisteredClaims,
};
pub use extractor::extract_bearer;
pub use jwks::{HttpKeySource, Jwk, JwkSet, KeyResolver, KeySource, KeySourceError};
pub use jwt::{JwtValidator, ValidationPolicy};
