use chrono::{DateTime, Utc};

use clientbook_auth::TokenClaims;

/// Authenticated caller, derived from a validated bearer token.
///
/// Inserted into request extensions by the auth middleware; only present on
/// protected routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectContext {
    subject: String,
    email: String,
    expires_at: DateTime<Utc>,
}

impl SubjectContext {
    pub fn from_claims(claims: &TokenClaims) -> Self {
        Self {
            subject: claims.sub.clone(),
            email: claims.email.clone(),
            expires_at: claims.exp,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}
