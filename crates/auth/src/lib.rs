//! `clientbook-auth`: bearer token issuance and validation.
//!
//! This crate is intentionally decoupled from HTTP and storage. Callers pass
//! the current time explicitly, so expiry is deterministic under test.

pub mod claims;
pub mod subject;
pub mod token;

pub use claims::{TokenClaims, TokenValidationError, validate_claims};
pub use subject::Subject;
pub use token::{Hs256TokenService, IssuedToken, TokenError, TokenIssuer, TokenSettings, TokenValidator};
