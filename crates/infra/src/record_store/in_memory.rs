use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use phonestore_core::{PhoneId, StoreId};
use phonestore_inventory::PhoneInventoryItem;

use super::{BatchRemoval, CasOutcome, PhoneRecordStore, RecordStoreError};

/// In-memory phone store for tests/dev.
///
/// Items are keyed by their time-ordered id, so listings come back in
/// creation order.
#[derive(Debug, Default)]
pub struct InMemoryPhoneStore {
    items: RwLock<BTreeMap<PhoneId, PhoneInventoryItem>>,
}

impl InMemoryPhoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PhoneRecordStore for InMemoryPhoneStore {
    fn get(&self, id: PhoneId) -> Result<Option<PhoneInventoryItem>, RecordStoreError> {
        let map = self.items.read().map_err(|_| RecordStoreError::Poisoned)?;
        Ok(map.get(&id).cloned())
    }

    fn get_many(&self, ids: &[PhoneId]) -> Result<Vec<PhoneInventoryItem>, RecordStoreError> {
        let map = self.items.read().map_err(|_| RecordStoreError::Poisoned)?;
        let mut seen = HashSet::with_capacity(ids.len());
        Ok(ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| map.get(id).cloned())
            .collect())
    }

    fn list_by_store(&self, store_id: &StoreId) -> Result<Vec<PhoneInventoryItem>, RecordStoreError> {
        let map = self.items.read().map_err(|_| RecordStoreError::Poisoned)?;
        Ok(map
            .values()
            .filter(|item| item.belongs_to(store_id))
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<PhoneInventoryItem>, RecordStoreError> {
        let map = self.items.read().map_err(|_| RecordStoreError::Poisoned)?;
        Ok(map.values().cloned().collect())
    }

    fn insert_all(&self, items: Vec<PhoneInventoryItem>) -> Result<(), RecordStoreError> {
        let mut map = self.items.write().map_err(|_| RecordStoreError::Poisoned)?;

        let mut batch = HashSet::with_capacity(items.len());
        for item in &items {
            let id = item.id_typed();
            if map.contains_key(&id) || !batch.insert(id) {
                return Err(RecordStoreError::DuplicateId(id));
            }
        }

        for item in items {
            map.insert(item.id_typed(), item);
        }
        Ok(())
    }

    fn compare_and_set_quantity(
        &self,
        id: PhoneId,
        expected: u32,
        new: u32,
    ) -> Result<CasOutcome, RecordStoreError> {
        let mut map = self.items.write().map_err(|_| RecordStoreError::Poisoned)?;
        let Some(current) = map.get_mut(&id) else {
            return Ok(CasOutcome::Missing);
        };
        if current.quantity() != expected {
            return Ok(CasOutcome::Stale(current.clone()));
        }
        *current = current.with_quantity(new);
        Ok(CasOutcome::Applied(current.clone()))
    }

    fn remove(&self, id: PhoneId) -> Result<bool, RecordStoreError> {
        let mut map = self.items.write().map_err(|_| RecordStoreError::Poisoned)?;
        Ok(map.remove(&id).is_some())
    }

    fn remove_all(&self, ids: &[PhoneId]) -> Result<BatchRemoval, RecordStoreError> {
        let mut map = self.items.write().map_err(|_| RecordStoreError::Poisoned)?;

        let mut missing: Vec<PhoneId> = ids.iter().filter(|id| !map.contains_key(*id)).copied().collect();
        if !missing.is_empty() {
            missing.dedup();
            return Ok(BatchRemoval::Missing(missing));
        }

        let removed = ids.iter().filter(|id| map.remove(*id).is_some()).count();
        Ok(BatchRemoval::Removed(removed))
    }

    fn remove_by_store(&self, store_id: &StoreId) -> Result<usize, RecordStoreError> {
        let mut map = self.items.write().map_err(|_| RecordStoreError::Poisoned)?;
        let before = map.len();
        map.retain(|_, item| !item.belongs_to(store_id));
        Ok(before - map.len())
    }
}
