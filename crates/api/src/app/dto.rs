use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Serialize;

use clientbook_core::ClientId;
use clientbook_infra::ClientSummary;

use crate::app::errors;
use crate::context::SubjectContext;

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCheckResponse {
    pub message: &'static str,
    pub subject: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenCheckResponse {
    pub fn for_subject(subject: &SubjectContext) -> Self {
        Self {
            message: "token is valid",
            subject: subject.subject().to_string(),
            email: subject.email().to_string(),
            expires_at: subject.expires_at(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub message: String,
    pub requested_by: String,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub summary: ClientSummary,
}

impl ReportResponse {
    pub fn new(subject: &SubjectContext, generated_at: DateTime<Utc>, summary: ClientSummary) -> Self {
        Self {
            message: format!("confidential client summary for {}", subject.subject()),
            requested_by: subject.subject().to_string(),
            generated_at,
            summary,
        }
    }
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_client_id(raw: &str) -> Result<ClientId, Response> {
    raw.parse::<ClientId>()
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
