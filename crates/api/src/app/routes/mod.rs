use axum::{Router, routing::get};

pub mod auth;
pub mod clients;
pub mod system;

/// Endpoints reachable without a token (mounted under `/api`).
pub fn public_router() -> Router {
    Router::new()
        .nest("/clients", clients::router())
        .route("/auth/token", get(auth::issue_token))
}

/// Endpoints behind the bearer-token middleware (mounted under `/api`).
pub fn protected_router() -> Router {
    Router::new()
        .route("/auth/validate", get(auth::validate_token))
        .route("/auth/report", get(auth::confidential_report))
}
