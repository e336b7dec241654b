//! Infrastructure layer: record store, engine, channels, routing, config.

pub mod config;
pub mod engine;
pub mod event_bus;
pub mod outcome;
pub mod publisher;
pub mod record_store;
pub mod router;
pub mod store_registry;
pub mod store_service;
pub mod workers;
