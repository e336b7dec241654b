//! Store records.
//!
//! Stores are referenced by inventory items only by id; nothing here knows
//! about items. Removing a store never touches inventory on its own, the
//! cascade is driven by `StoreService`.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use phonestore_core::{DomainError, StoreId};
use phonestore_stores::{Store, StoreDraft, StoreUpdate};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("store registry lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub trait StoreRegistry: Send + Sync {
    /// Create a store under a fresh id.
    ///
    /// Rejected with `DuplicateConflict` if another store already sits at the
    /// same name + address.
    fn create(&self, draft: StoreDraft) -> Result<Store, RegistryError>;

    fn get(&self, id: &StoreId) -> Result<Option<Store>, RegistryError>;

    fn list(&self) -> Result<Vec<Store>, RegistryError>;

    /// Replace a store's details. `NotFound` if it is absent.
    fn update(&self, update: StoreUpdate) -> Result<Store, RegistryError>;

    /// Remove a store record; `None` if it was absent.
    fn remove(&self, id: &StoreId) -> Result<Option<Store>, RegistryError>;
}

impl<R> StoreRegistry for Arc<R>
where
    R: StoreRegistry + ?Sized,
{
    fn create(&self, draft: StoreDraft) -> Result<Store, RegistryError> {
        (**self).create(draft)
    }

    fn get(&self, id: &StoreId) -> Result<Option<Store>, RegistryError> {
        (**self).get(id)
    }

    fn list(&self) -> Result<Vec<Store>, RegistryError> {
        (**self).list()
    }

    fn update(&self, update: StoreUpdate) -> Result<Store, RegistryError> {
        (**self).update(update)
    }

    fn remove(&self, id: &StoreId) -> Result<Option<Store>, RegistryError> {
        (**self).remove(id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStoreRegistry {
    stores: RwLock<BTreeMap<StoreId, Store>>,
}

impl InMemoryStoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

fn duplicate(store_name: &str, address: &str) -> DomainError {
    DomainError::duplicate(format!(
        "a store named '{store_name}' already exists at '{address}'"
    ))
}

impl StoreRegistry for InMemoryStoreRegistry {
    fn create(&self, draft: StoreDraft) -> Result<Store, RegistryError> {
        let store = Store::from_draft(StoreId::generate(), draft)?;
        let mut map = self.stores.write().map_err(|_| RegistryError::Poisoned)?;

        if map
            .values()
            .any(|s| s.same_location(store.store_name(), store.address()))
        {
            return Err(duplicate(store.store_name(), store.address()).into());
        }

        map.insert(store.id_typed().clone(), store.clone());
        Ok(store)
    }

    fn get(&self, id: &StoreId) -> Result<Option<Store>, RegistryError> {
        let map = self.stores.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(map.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Store>, RegistryError> {
        let map = self.stores.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(map.values().cloned().collect())
    }

    fn update(&self, update: StoreUpdate) -> Result<Store, RegistryError> {
        let mut map = self.stores.write().map_err(|_| RegistryError::Poisoned)?;
        let id = update.id.clone();

        let mut store = map
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("store {id} not found")))?;
        store.apply(update)?;

        // Uniqueness holds across updates too; the store may keep its own pair.
        if map
            .values()
            .any(|s| s.id_typed() != &id && s.same_location(store.store_name(), store.address()))
        {
            return Err(duplicate(store.store_name(), store.address()).into());
        }

        map.insert(id, store.clone());
        Ok(store)
    }

    fn remove(&self, id: &StoreId) -> Result<Option<Store>, RegistryError> {
        let mut map = self.stores.write().map_err(|_| RegistryError::Poisoned)?;
        Ok(map.remove(id))
    }
}
