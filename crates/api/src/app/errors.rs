use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use clientbook_clients::ValidationFailure;
use clientbook_infra::ServiceError;

pub fn service_error_to_response(err: ServiceError) -> Response {
    match err {
        ServiceError::Validation(failure) => validation_error(&failure),
        ServiceError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "client not found"),
        e @ ServiceError::IdentifierMismatch { .. } => {
            json_error(StatusCode::BAD_REQUEST, "identifier_mismatch", e.to_string())
        }
        ServiceError::Referential(msg) => {
            json_error(StatusCode::CONFLICT, "referential_integrity", msg)
        }
        ServiceError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::Store(msg) => {
            // Backend details stay in the logs.
            tracing::error!(error = %msg, "record store failure");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                "internal storage error",
            )
        }
    }
}

pub fn validation_error(failure: &ValidationFailure) -> Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "error": "validation_error",
            "message": failure.to_string(),
            "rule": failure.rule,
            "field": failure.field,
            "contactPosition": failure.contact_position,
        })),
    )
        .into_response()
}

/// Body that is not JSON, or JSON of the wrong shape.
pub fn json_rejection_to_response(rejection: JsonRejection) -> Response {
    json_error(rejection.status(), "invalid_body", rejection.body_text())
}

/// Uniform rejection for protected routes; never says why.
pub fn unauthenticated() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(json!({ "error": "unauthenticated" })),
    )
        .into_response()
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
