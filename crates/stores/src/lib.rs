//! Store records.
//!
//! Stores own inventory only by reference: items carry a `StoreId` and nothing
//! here knows about quantities.

pub mod store;

pub use store::{Store, StoreDraft, StoreUpdate};
