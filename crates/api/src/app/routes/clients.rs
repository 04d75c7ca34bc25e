use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};

use clientbook_clients::ClientDraft;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_clients).post(create_client))
        .route("/:id", get(get_client).put(update_client).delete(delete_client))
}

pub async fn list_clients(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.clients.list_clients().await {
        Ok(clients) => (StatusCode::OK, Json(clients)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_client(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id = match dto::parse_client_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.clients.get_client(id).await {
        Ok(client) => (StatusCode::OK, Json(client)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_client(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<ClientDraft>, JsonRejection>,
) -> Response {
    let Json(draft) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services.clients.create_client(draft).await {
        Ok(client) => {
            let location = format!("/api/clients/{}", client.id);
            (StatusCode::CREATED, [(header::LOCATION, location)], Json(client)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_client(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<ClientDraft>, JsonRejection>,
) -> Response {
    let id = match dto::parse_client_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(draft) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services.clients.update_client(id, draft).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_client(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id = match dto::parse_client_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.clients.delete_client(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
