use axum::Router;

pub mod inventory;
pub mod requests;
pub mod stores;
pub mod system;

/// Router for every service endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .nest("/store", stores::router())
        .nest("/inventory", inventory::router())
        .nest("/requests", requests::router())
}
