//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: infrastructure wiring (bus, engine, router, consumer workers)
//! - `routes/`: HTTP routes + handlers (one file per surface)
//! - `dto.rs`: request DTOs and boundary validation
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use phonestore_infra::config::ServiceConfig;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::{AppServices, BootError};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// The returned services own the consumer workers; call
/// `AppServices::shutdown` once the server has stopped.
pub fn build_app(config: &ServiceConfig) -> Result<(Router, Arc<AppServices>), BootError> {
    let services = Arc::new(services::build_services(config)?);
    Ok((router_with(Arc::clone(&services)), services))
}

pub fn router_with(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(Extension(services))
        .layer(ServiceBuilder::new())
}
