//! HS256 bearer tokens signed with a single shared secret.
//!
//! Lifecycle per token: issued, valid until its embedded `exp`, then expired.
//! There is no revocation list and no server-side session state.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use thiserror::Error;

use crate::{Subject, TokenClaims, TokenValidationError, validate_claims};

/// Signing configuration shared by issuer and validator.
#[derive(Clone)]
pub struct TokenSettings {
    pub secret: Vec<u8>,
    pub issuer: String,
    pub audience: String,
    pub lifetime: Duration,
}

impl TokenSettings {
    pub const DEFAULT_LIFETIME_MINUTES: i64 = 10;

    pub fn new(secret: impl Into<Vec<u8>>, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            lifetime: Duration::minutes(Self::DEFAULT_LIFETIME_MINUTES),
        }
    }
}

impl core::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

/// A freshly signed token and the instant it stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token issuer does not match")]
    InvalidIssuer,

    #[error("token audience does not match")]
    InvalidAudience,

    #[error(transparent)]
    Claims(#[from] TokenValidationError),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

pub trait TokenIssuer: Send + Sync {
    fn issue(&self, subject: &Subject, now: DateTime<Utc>) -> Result<IssuedToken, TokenError>;
}

pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError>;
}

/// Stateless HS256 issuer/validator pair.
#[derive(Clone)]
pub struct Hs256TokenService {
    settings: TokenSettings,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl Hs256TokenService {
    pub fn new(settings: TokenSettings) -> Self {
        let encoding = EncodingKey::from_secret(&settings.secret);
        let decoding = DecodingKey::from_secret(&settings.secret);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_audience(&[settings.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        // Time window is checked by `validate_claims` against the caller's clock.
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            settings,
            encoding,
            decoding,
            validation,
        }
    }
}

impl core::fmt::Debug for Hs256TokenService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256TokenService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer for Hs256TokenService {
    fn issue(&self, subject: &Subject, now: DateTime<Utc>) -> Result<IssuedToken, TokenError> {
        // Registered claims are whole seconds; keep the reported expiry identical.
        let iat = now.trunc_subsecs(0);
        let claims = TokenClaims {
            sub: subject.id.clone(),
            email: subject.email.clone(),
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            iat,
            exp: iat + self.settings.lifetime,
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        tracing::debug!(sub = %claims.sub, exp = %claims.exp, "issued bearer token");

        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }
}

impl TokenValidator for Hs256TokenService {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| map_jwt_error(e.kind()))?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

fn map_jwt_error(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
        ErrorKind::InvalidAudience => TokenError::InvalidAudience,
        ErrorKind::ExpiredSignature => TokenError::Claims(TokenValidationError::Expired),
        _ => TokenError::Malformed,
    }
}
