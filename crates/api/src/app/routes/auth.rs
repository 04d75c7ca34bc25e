use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use clientbook_auth::{Subject, TokenIssuer};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::SubjectContext;

/// Hand out a token for the fixed demonstration subject.
///
/// Demonstration login only: there is no credential check.
pub async fn issue_token(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.tokens.issue(&Subject::demo(), Utc::now()) {
        Ok(issued) => (StatusCode::OK, Json(issued)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to issue token");
            errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "token_error",
                "failed to issue token",
            )
        }
    }
}

pub async fn validate_token(Extension(subject): Extension<SubjectContext>) -> Response {
    (StatusCode::OK, Json(dto::TokenCheckResponse::for_subject(&subject))).into_response()
}

pub async fn confidential_report(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(subject): Extension<SubjectContext>,
) -> Response {
    let now = services.clients.now();
    match services.clients.summary(now).await {
        Ok(summary) => {
            tracing::info!(subject = %subject.subject(), "confidential report served");
            (StatusCode::OK, Json(dto::ReportResponse::new(&subject, now, summary))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}
