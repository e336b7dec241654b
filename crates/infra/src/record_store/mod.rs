//! Keyed storage for phone inventory items.
//!
//! The record store knows nothing about channels or envelopes. Every write
//! that depends on a previous read goes through `compare_and_set_quantity`,
//! so concurrent writers to the same item serialize on the stored quantity
//! instead of overwriting each other.

pub mod in_memory;

pub use in_memory::InMemoryPhoneStore;

use std::sync::Arc;

use thiserror::Error;

use phonestore_core::{PhoneId, StoreId};
use phonestore_inventory::PhoneInventoryItem;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordStoreError {
    #[error("record store lock poisoned")]
    Poisoned,

    #[error("phone id {0} is already stored")]
    DuplicateId(PhoneId),
}

/// Result of a compare-and-set on an item's quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The stored quantity matched; this is the item as written.
    Applied(PhoneInventoryItem),
    /// Another writer got there first; this is the item as currently stored.
    Stale(PhoneInventoryItem),
    /// The item no longer exists.
    Missing,
}

/// Result of an all-or-nothing batch removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchRemoval {
    Removed(usize),
    /// Nothing was removed because these ids were absent.
    Missing(Vec<PhoneId>),
}

pub trait PhoneRecordStore: Send + Sync {
    fn get(&self, id: PhoneId) -> Result<Option<PhoneInventoryItem>, RecordStoreError>;

    /// Items for the ids that exist, in request order; absent ids are skipped.
    fn get_many(&self, ids: &[PhoneId]) -> Result<Vec<PhoneInventoryItem>, RecordStoreError>;

    fn list_by_store(&self, store_id: &StoreId) -> Result<Vec<PhoneInventoryItem>, RecordStoreError>;

    fn list_all(&self) -> Result<Vec<PhoneInventoryItem>, RecordStoreError>;

    /// Store a batch of fresh items. Fails without writing if any id is taken.
    fn insert_all(&self, items: Vec<PhoneInventoryItem>) -> Result<(), RecordStoreError>;

    /// Write `new` as the item's quantity only if it still equals `expected`.
    /// Availability is recomputed on every applied write.
    fn compare_and_set_quantity(
        &self,
        id: PhoneId,
        expected: u32,
        new: u32,
    ) -> Result<CasOutcome, RecordStoreError>;

    /// Remove one item; `false` if it was absent.
    fn remove(&self, id: PhoneId) -> Result<bool, RecordStoreError>;

    /// Remove every listed item, or none of them if any is absent.
    fn remove_all(&self, ids: &[PhoneId]) -> Result<BatchRemoval, RecordStoreError>;

    /// Remove every item scoped to `store_id`; returns how many went.
    fn remove_by_store(&self, store_id: &StoreId) -> Result<usize, RecordStoreError>;
}

impl<S> PhoneRecordStore for Arc<S>
where
    S: PhoneRecordStore + ?Sized,
{
    fn get(&self, id: PhoneId) -> Result<Option<PhoneInventoryItem>, RecordStoreError> {
        (**self).get(id)
    }

    fn get_many(&self, ids: &[PhoneId]) -> Result<Vec<PhoneInventoryItem>, RecordStoreError> {
        (**self).get_many(ids)
    }

    fn list_by_store(&self, store_id: &StoreId) -> Result<Vec<PhoneInventoryItem>, RecordStoreError> {
        (**self).list_by_store(store_id)
    }

    fn list_all(&self) -> Result<Vec<PhoneInventoryItem>, RecordStoreError> {
        (**self).list_all()
    }

    fn insert_all(&self, items: Vec<PhoneInventoryItem>) -> Result<(), RecordStoreError> {
        (**self).insert_all(items)
    }

    fn compare_and_set_quantity(
        &self,
        id: PhoneId,
        expected: u32,
        new: u32,
    ) -> Result<CasOutcome, RecordStoreError> {
        (**self).compare_and_set_quantity(id, expected, new)
    }

    fn remove(&self, id: PhoneId) -> Result<bool, RecordStoreError> {
        (**self).remove(id)
    }

    fn remove_all(&self, ids: &[PhoneId]) -> Result<BatchRemoval, RecordStoreError> {
        (**self).remove_all(ids)
    }

    fn remove_by_store(&self, store_id: &StoreId) -> Result<usize, RecordStoreError> {
        (**self).remove_by_store(store_id)
    }
}
