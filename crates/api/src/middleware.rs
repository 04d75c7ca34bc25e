use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use clientbook_auth::TokenValidator;

use crate::app::errors;
use crate::context::SubjectContext;

#[derive(Clone)]
pub struct AuthState {
    pub tokens: Arc<dyn TokenValidator>,
}

/// Require a valid bearer token.
///
/// Every failure (missing header, wrong scheme, bad signature, expiry) gets
/// the same 401 body; the cause is only logged.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let Some(token) = extract_bearer(req.headers()) else {
        tracing::debug!(path = %req.uri().path(), "missing or malformed bearer header");
        return Err(errors::unauthenticated());
    };

    let claims = state.tokens.validate(token, Utc::now()).map_err(|e| {
        tracing::debug!(path = %req.uri().path(), error = %e, "bearer token rejected");
        errors::unauthenticated()
    })?;

    req.extensions_mut()
        .insert(SubjectContext::from_claims(&claims));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
