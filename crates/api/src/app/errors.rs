use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use phonestore_core::DomainError;
use phonestore_infra::engine::EngineError;
use phonestore_infra::store_service::StoreServiceError;

pub fn domain_error_to_response(err: &DomainError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        DomainError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        DomainError::PayloadShape(_) => json_error(StatusCode::BAD_REQUEST, "payload_shape", message),
        DomainError::InvalidId(_) => json_error(StatusCode::BAD_REQUEST, "invalid_id", message),
        DomainError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        DomainError::InsufficientQuantity { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "insufficient_quantity", message)
        }
        DomainError::DuplicateConflict(_) => json_error(StatusCode::CONFLICT, "duplicate", message),
        DomainError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
    }
}

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    match err {
        EngineError::Domain(e) => domain_error_to_response(&e),
        EngineError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            e.to_string(),
        ),
    }
}

pub fn store_service_error_to_response(err: StoreServiceError) -> axum::response::Response {
    match err {
        StoreServiceError::Domain(e) => domain_error_to_response(&e),
        StoreServiceError::Registry => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            "store registry unavailable",
        ),
        StoreServiceError::Publish(e) => json_error(StatusCode::BAD_GATEWAY, "publish_error", e.to_string()),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
