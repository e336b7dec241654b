//! `/requests`: what happened to a published command.
//!
//! Publishing never waits for the consumer. Clients poll here with the
//! correlation id from their acknowledgement; `404` means the envelope has
//! not been routed yet (or its outcome was evicted).

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use phonestore_core::CorrelationId;

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/dead-letters", get(dead_letters))
        .route("/:id", get(outcome))
}

pub async fn outcome(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let cid: CorrelationId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid correlation id"),
    };
    match services.outcomes().outcome(cid) {
        Some(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "no outcome recorded yet"),
    }
}

pub async fn dead_letters(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    (StatusCode::OK, Json(services.outcomes().dead_letters())).into_response()
}
