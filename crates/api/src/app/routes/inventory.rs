//! `/inventory`: synchronous access to the inventory engine.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
};

use phonestore_core::DomainError;
use phonestore_inventory::{PhoneModel, RawPhoneDraft};

use crate::app::dto::{self, DecreaseRequest, ListQuery};
use crate::app::errors;
use crate::app::services::AppServices;

pub const INCREASE_AMOUNT_HEADER: &str = "x-increase-amount";

pub fn router() -> Router {
    Router::new()
        .route("/", post(add_phones))
        .route("/id/:id", get(get_by_id).delete(delete_by_id))
        .route("/ids", get(get_by_ids).delete(delete_by_ids))
        .route("/model/:model", get(get_by_model))
        .route("/models", get(get_by_models))
        .route("/store/:id", get(get_by_store))
        .route("/decrease", put(decrease_quantity))
        .route("/:id/increase", put(increase_quantity))
}

pub async fn get_by_id(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_phone_id(Some(&id)) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(&e),
    };
    match services.engine().get_by_id(id) {
        Ok(Some(item)) => (StatusCode::OK, Json(item)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "phone not found"),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_by_ids(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<ListQuery>,
) -> axum::response::Response {
    let ids = match q.phone_ids() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(&e),
    };
    match services.engine().get_by_ids(&ids) {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_by_model(
    Extension(services): Extension<Arc<AppServices>>,
    Path(model): Path<String>,
) -> axum::response::Response {
    let model = match model.parse::<PhoneModel>() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(&e),
    };
    match services.engine().get_by_model(model) {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_by_models(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<ListQuery>,
) -> axum::response::Response {
    let models = match q.phone_models() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(&e),
    };
    match services.engine().get_by_models(&models) {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_by_store(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let store = match dto::parse_store_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(&e),
    };
    match services.engine().get_by_store(&store) {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Unscoped stock, as the standalone inventory service creates it.
pub async fn add_phones(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<Vec<RawPhoneDraft>>,
) -> axum::response::Response {
    let drafts = match dto::phone_drafts(body) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(&e),
    };
    match services.engine().add_batch(drafts, None) {
        Ok(items) => (StatusCode::CREATED, Json(items)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn delete_by_id(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_phone_id(Some(&id)) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(&e),
    };
    match services.engine().delete_one(id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "phone not found"),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// All-or-nothing: one unknown id and nothing is deleted.
pub async fn delete_by_ids(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<ListQuery>,
) -> axum::response::Response {
    let ids = match q.phone_ids() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(&e),
    };
    match services.engine().delete_many(&ids) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn increase_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> axum::response::Response {
    let parsed = dto::parse_phone_id(Some(&id)).and_then(|id| Ok((id, increase_amount(&headers)?)));
    let (id, amount) = match parsed {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(&e),
    };
    match services.engine().increase(id, amount) {
        Ok(Some(item)) => (StatusCode::OK, Json(item)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "phone not found"),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn decrease_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<DecreaseRequest>,
) -> axum::response::Response {
    let (id, amount) = match body.into_parts() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(&e),
    };
    match services.engine().decrease_unscoped(id, amount) {
        Ok(Some(item)) => (StatusCode::OK, Json(item)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "phone not found"),
        Err(e) => errors::engine_error_to_response(e),
    }
}

fn increase_amount(headers: &HeaderMap) -> Result<u32, DomainError> {
    let raw = headers
        .get(INCREASE_AMOUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| DomainError::validation("X-Increase-Amount header is required"))?;
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => u32::try_from(n).map_err(|_| DomainError::validation("Increase amount is out of range")),
        Ok(_) => Err(DomainError::validation("Increase amount must be greater than 0")),
        Err(_) => Err(DomainError::validation("Increase amount must be a valid integer")),
    }
}
