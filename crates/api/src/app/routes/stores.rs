//! `/store`: store records and the asynchronous inventory requests.
//!
//! Store CRUD answers with the record. Every inventory operation is published
//! onto its channel and answered with `202 Accepted` plus the correlation id
//! to poll under `/requests/:correlation_id`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde_json::json;

use phonestore_inventory::{PhoneModel, RawPhoneDraft};
use phonestore_stores::{StoreDraft, StoreUpdate};

use crate::app::dto::{self, ListQuery, OrderRequest, QuantityRequest};
use crate::app::errors;
use crate::app::services::AppServices;
use phonestore_infra::store_service::{RequestAck, StoreServiceResult};

pub fn router() -> Router {
    Router::new()
        .route("/createStore", post(create_store))
        .route("/updateStore", put(update_store))
        .route("/orderPhones", post(order_phones))
        .route("/increaseQuantity", put(increase_quantity))
        .route("/decreaseQuantity", put(decrease_quantity))
        .route("/catalog", get(catalog))
        .route("/id/:id", get(get_phone).delete(delete_phone))
        .route("/ids", get(get_phones).delete(delete_phones))
        .route("/model/:model", get(get_phones_by_model))
        .route("/models", get(get_phones_by_models))
        .route("/:id/addPhones", post(add_phones))
        .route("/:id/phones", get(phones_for_store))
        .route("/:id", get(get_store).delete(delete_store))
}

fn accepted(result: StoreServiceResult<RequestAck>) -> axum::response::Response {
    match result {
        Ok(ack) => (StatusCode::ACCEPTED, Json(ack)).into_response(),
        Err(e) => errors::store_service_error_to_response(e),
    }
}

pub async fn create_store(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<StoreDraft>,
) -> axum::response::Response {
    match services.stores().create_store(body) {
        Ok(store) => (StatusCode::CREATED, Json(store)).into_response(),
        Err(e) => errors::store_service_error_to_response(e),
    }
}

pub async fn get_store(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_store_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(&e),
    };
    match services.stores().get_store(&id) {
        Ok(store) => (StatusCode::OK, Json(store)).into_response(),
        Err(e) => errors::store_service_error_to_response(e),
    }
}

pub async fn update_store(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<StoreUpdate>,
) -> axum::response::Response {
    match services.stores().update_store(body) {
        Ok(store) => (StatusCode::OK, Json(store)).into_response(),
        Err(e) => errors::store_service_error_to_response(e),
    }
}

/// Deletes the record after publishing the inventory cascade; the body
/// carries the cascade's correlation id.
pub async fn delete_store(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_store_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(&e),
    };
    match services.stores().delete_store(&id) {
        Ok(cid) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "Store deleted",
                "correlationId": cid,
                "message": "Store inventory will be removed",
            })),
        )
            .into_response(),
        Err(e) => errors::store_service_error_to_response(e),
    }
}

pub async fn order_phones(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<OrderRequest>,
) -> axum::response::Response {
    match body.into_batch() {
        Ok(batch) => accepted(services.stores().order_phones(batch)),
        Err(e) => errors::domain_error_to_response(&e),
    }
}

pub async fn increase_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<QuantityRequest>,
) -> axum::response::Response {
    match body.into_parts() {
        Ok((id, quantity, store)) => accepted(services.stores().increase_quantity(id, quantity, store)),
        Err(e) => errors::domain_error_to_response(&e),
    }
}

pub async fn decrease_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<QuantityRequest>,
) -> axum::response::Response {
    match body.into_parts() {
        Ok((id, quantity, store)) => accepted(services.stores().decrease_quantity(id, quantity, store)),
        Err(e) => errors::domain_error_to_response(&e),
    }
}

pub async fn get_phone(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match dto::parse_phone_id(Some(&id)) {
        Ok(id) => accepted(services.stores().get_phone(id)),
        Err(e) => errors::domain_error_to_response(&e),
    }
}

pub async fn get_phones(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<ListQuery>,
) -> axum::response::Response {
    match q.phone_ids() {
        Ok(ids) => accepted(services.stores().get_phones(ids)),
        Err(e) => errors::domain_error_to_response(&e),
    }
}

pub async fn get_phones_by_model(
    Extension(services): Extension<Arc<AppServices>>,
    Path(model): Path<String>,
) -> axum::response::Response {
    match model.parse::<PhoneModel>() {
        Ok(model) => accepted(services.stores().get_phones_by_model(model)),
        Err(e) => errors::domain_error_to_response(&e),
    }
}

pub async fn get_phones_by_models(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<ListQuery>,
) -> axum::response::Response {
    match q.phone_models() {
        Ok(models) => accepted(services.stores().get_phones_by_models(models)),
        Err(e) => errors::domain_error_to_response(&e),
    }
}

pub async fn catalog(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    accepted(services.stores().catalog())
}

pub async fn delete_phone(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match dto::parse_phone_id(Some(&id)) {
        Ok(id) => accepted(services.stores().delete_phone(id)),
        Err(e) => errors::domain_error_to_response(&e),
    }
}

pub async fn delete_phones(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<ListQuery>,
) -> axum::response::Response {
    match q.phone_ids() {
        Ok(ids) => accepted(services.stores().delete_phones(ids)),
        Err(e) => errors::domain_error_to_response(&e),
    }
}

pub async fn add_phones(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<Vec<RawPhoneDraft>>,
) -> axum::response::Response {
    let parsed = dto::parse_store_id(&id).and_then(|store| Ok((store, dto::phone_drafts(body)?)));
    match parsed {
        Ok((store, drafts)) => accepted(services.stores().add_phones(&store, drafts)),
        Err(e) => errors::domain_error_to_response(&e),
    }
}

pub async fn phones_for_store(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match dto::parse_store_id(&id) {
        Ok(store) => accepted(services.stores().phones_for_store(&store)),
        Err(e) => errors::domain_error_to_response(&e),
    }
}
