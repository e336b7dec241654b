//! Inventory mutation engine.
//!
//! Business rules over a `PhoneRecordStore`: quantity arithmetic, existence
//! checks and batch validate-then-mutate. The engine knows nothing about
//! channels; the router and the HTTP layer both call it directly.
//!
//! Quantity changes are read-modify-write. Each one runs as a bounded
//! compare-and-set loop on the stored quantity, so two writers racing on the
//! same item can never take it below zero or lose an update. When the loop
//! keeps losing, the change fails with `DomainError::Conflict` instead of
//! spinning.

use chrono::Utc;
use thiserror::Error;

use phonestore_core::{DomainError, DomainResult, PhoneId, StoreId};
use phonestore_inventory::{PhoneDraft, PhoneInventoryItem, PhoneModel};

use crate::record_store::{BatchRemoval, CasOutcome, PhoneRecordStore, RecordStoreError};

/// Default number of compare-and-set attempts per quantity change.
pub const DEFAULT_CAS_ATTEMPTS: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("record store failure: {0}")]
    Store(#[from] RecordStoreError),
}

impl EngineError {
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            EngineError::Store(_) => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug)]
pub struct InventoryEngine<S> {
    store: S,
    cas_attempts: usize,
}

impl<S> InventoryEngine<S>
where
    S: PhoneRecordStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cas_attempts: DEFAULT_CAS_ATTEMPTS,
        }
    }

    pub fn with_cas_attempts(mut self, attempts: usize) -> Self {
        self.cas_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ---- reads

    pub fn get_by_id(&self, id: PhoneId) -> EngineResult<Option<PhoneInventoryItem>> {
        Ok(self.store.get(id)?)
    }

    pub fn get_by_ids(&self, ids: &[PhoneId]) -> EngineResult<Vec<PhoneInventoryItem>> {
        Ok(self.store.get_many(ids)?)
    }

    pub fn get_by_model(&self, model: PhoneModel) -> EngineResult<Vec<PhoneInventoryItem>> {
        self.get_by_models(&[model])
    }

    pub fn get_by_models(&self, models: &[PhoneModel]) -> EngineResult<Vec<PhoneInventoryItem>> {
        let all = self.store.list_all()?;
        Ok(all
            .into_iter()
            .filter(|item| models.contains(&item.model()))
            .collect())
    }

    pub fn get_all(&self) -> EngineResult<Vec<PhoneInventoryItem>> {
        Ok(self.store.list_all()?)
    }

    pub fn get_by_store(&self, store_id: &StoreId) -> EngineResult<Vec<PhoneInventoryItem>> {
        Ok(self.store.list_by_store(store_id)?)
    }

    // ---- quantity changes

    /// Add `amount` units. A missing item is a silent no-op (`Ok(None)`).
    pub fn increase(&self, id: PhoneId, amount: u32) -> EngineResult<Option<PhoneInventoryItem>> {
        self.update_quantity(id, None, |item| item.increased_by(amount))
    }

    /// Remove `amount` units from the item when it is stocked by `store_id`.
    ///
    /// An item that is absent, or that belongs to another store, is not
    /// touched (`Ok(None)`).
    pub fn decrease(
        &self,
        id: PhoneId,
        amount: u32,
        store_id: &StoreId,
    ) -> EngineResult<Option<PhoneInventoryItem>> {
        self.update_quantity(id, Some(store_id), |item| item.decreased_by(amount))
    }

    /// Remove `amount` units whatever store the item belongs to.
    pub fn decrease_unscoped(
        &self,
        id: PhoneId,
        amount: u32,
    ) -> EngineResult<Option<PhoneInventoryItem>> {
        self.update_quantity(id, None, |item| item.decreased_by(amount))
    }

    fn update_quantity<F>(
        &self,
        id: PhoneId,
        scope: Option<&StoreId>,
        next_quantity: F,
    ) -> EngineResult<Option<PhoneInventoryItem>>
    where
        F: Fn(&PhoneInventoryItem) -> DomainResult<u32>,
    {
        let mut current = match self.store.get(id)? {
            Some(item) => item,
            None => return Ok(None),
        };
        if let Some(store_id) = scope {
            if !current.belongs_to(store_id) {
                tracing::debug!(phone_id = %id, store_id = %store_id, "phone not stocked by store");
                return Ok(None);
            }
        }

        for attempt in 1..=self.cas_attempts {
            let next = next_quantity(&current)?;
            match self.store.compare_and_set_quantity(id, current.quantity(), next)? {
                CasOutcome::Applied(item) => return Ok(Some(item)),
                CasOutcome::Missing => return Ok(None),
                CasOutcome::Stale(latest) => {
                    tracing::trace!(phone_id = %id, attempt, "quantity changed underneath, retrying");
                    current = latest;
                }
            }
        }

        Err(DomainError::conflict(format!(
            "phone {id} kept changing; gave up after {} attempts",
            self.cas_attempts
        ))
        .into())
    }

    // ---- creation

    /// Materialize drafts under `store_id` and persist them as one batch.
    ///
    /// Drafts are already validated by their type; each gets a fresh id and
    /// the same creation timestamp.
    pub fn add_batch(
        &self,
        drafts: Vec<PhoneDraft>,
        store_id: Option<StoreId>,
    ) -> EngineResult<Vec<PhoneInventoryItem>> {
        let now = Utc::now();
        let items: Vec<PhoneInventoryItem> = drafts
            .into_iter()
            .map(|draft| PhoneInventoryItem::from_draft(draft, store_id.clone(), now))
            .collect();
        self.store.insert_all(items.clone())?;
        Ok(items)
    }

    // ---- removal

    /// Remove one item; `false` when it was already absent.
    pub fn delete_one(&self, id: PhoneId) -> EngineResult<bool> {
        Ok(self.store.remove(id)?)
    }

    /// Remove every listed item, or none of them.
    pub fn delete_many(&self, ids: &[PhoneId]) -> EngineResult<usize> {
        match self.store.remove_all(ids)? {
            BatchRemoval::Removed(n) => Ok(n),
            BatchRemoval::Missing(missing) => {
                let listed: Vec<String> = missing.iter().map(ToString::to_string).collect();
                Err(DomainError::not_found(format!(
                    "phones with ids not found: [{}]",
                    listed.join(", ")
                ))
                .into())
            }
        }
    }

    /// Remove all items of a store; `NotFound` when the store has none.
    pub fn delete_by_store(&self, store_id: &StoreId) -> EngineResult<usize> {
        match self.store.remove_by_store(store_id)? {
            0 => Err(DomainError::not_found(format!("no phones found for store id: {store_id}")).into()),
            n => Ok(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use proptest::prelude::*;

    use phonestore_inventory::Price;

    use crate::record_store::InMemoryPhoneStore;

    fn engine() -> InventoryEngine<Arc<InMemoryPhoneStore>> {
        InventoryEngine::new(Arc::new(InMemoryPhoneStore::new()))
    }

    fn store_id(s: &str) -> StoreId {
        s.parse().unwrap()
    }

    fn draft(model: PhoneModel, quantity: u32) -> PhoneDraft {
        PhoneDraft {
            model,
            price: Price::from_cents(10_000),
            quantity,
        }
    }

    fn seed(engine: &InventoryEngine<Arc<InMemoryPhoneStore>>, store: &str, quantity: u32) -> PhoneId {
        engine
            .add_batch(vec![draft(PhoneModel::Apple, quantity)], Some(store_id(store)))
            .unwrap()[0]
            .id_typed()
    }

    #[test]
    fn decrease_beyond_stock_is_rejected_and_leaves_quantity() {
        let engine = engine();
        let id = seed(&engine, "s-1", 3);

        let err = engine.decrease(id, 999_999, &store_id("s-1")).unwrap_err();
        assert_eq!(err, EngineError::Domain(DomainError::insufficient_quantity(999_999, 3)));
        assert_eq!(engine.get_by_id(id).unwrap().unwrap().quantity(), 3);
    }

    #[test]
    fn scoped_decrease_ignores_items_of_other_stores() {
        let engine = engine();
        let id = seed(&engine, "s-1", 3);

        assert_eq!(engine.decrease(id, 1, &store_id("s-2")).unwrap(), None);
        assert_eq!(engine.get_by_id(id).unwrap().unwrap().quantity(), 3);

        let item = engine.decrease_unscoped(id, 3).unwrap().unwrap();
        assert_eq!(item.quantity(), 0);
        assert!(!item.is_available());
    }

    #[test]
    fn increase_on_missing_item_is_a_no_op() {
        let engine = engine();
        assert_eq!(engine.increase(PhoneId::new(), 5).unwrap(), None);
        assert!(engine.get_all().unwrap().is_empty());
    }

    #[test]
    fn increase_restores_availability() {
        let engine = engine();
        let id = seed(&engine, "s-1", 0);
        assert!(!engine.get_by_id(id).unwrap().unwrap().is_available());
        let item = engine.increase(id, 2).unwrap().unwrap();
        assert!(item.is_available());
    }

    #[test]
    fn delete_many_is_all_or_nothing() {
        let engine = engine();
        let id1 = seed(&engine, "s-1", 1);
        let id2 = PhoneId::new();

        let err = engine.delete_many(&[id1, id2]).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::NotFound(ref m)) if m.contains(&id2.to_string())));
        assert!(engine.get_by_id(id1).unwrap().is_some());
    }

    #[test]
    fn delete_by_store_on_empty_store_is_not_found() {
        let engine = engine();
        seed(&engine, "s-1", 1);
        let err = engine.delete_by_store(&store_id("s-9")).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::NotFound(_))));
        assert_eq!(engine.get_all().unwrap().len(), 1);
    }

    #[test]
    fn delete_one_is_a_no_op_when_absent() {
        let engine = engine();
        assert!(!engine.delete_one(PhoneId::new()).unwrap());
    }

    #[test]
    fn models_filter_matches_any_listed_model() {
        let engine = engine();
        engine
            .add_batch(
                vec![
                    draft(PhoneModel::Apple, 1),
                    draft(PhoneModel::Samsung, 1),
                    draft(PhoneModel::Xiaomi, 1),
                ],
                Some(store_id("s-1")),
            )
            .unwrap();
        let found = engine
            .get_by_models(&[PhoneModel::Apple, PhoneModel::Xiaomi])
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(engine.get_by_model(PhoneModel::Google).unwrap().len(), 0);
    }

    #[test]
    fn concurrent_decreases_never_oversell() {
        let engine = Arc::new(engine().with_cas_attempts(1_000));
        let id = seed(&engine, "s-1", 100);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    (0..20)
                        .filter(|_| engine.decrease_unscoped(id, 1).is_ok())
                        .count()
                })
            })
            .collect();
        let sold: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(sold, 100);
        assert_eq!(engine.get_by_id(id).unwrap().unwrap().quantity(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn add_batch_derives_availability_and_distinct_ids(quantities in prop::collection::vec(0u32..5, 1..20)) {
            let engine = engine();
            let drafts = quantities.iter().map(|q| draft(PhoneModel::Google, *q)).collect();
            let items = engine.add_batch(drafts, Some(store_id("s-1"))).unwrap();

            let mut ids: Vec<_> = items.iter().map(|i| i.id_typed()).collect();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), quantities.len());
            for item in &items {
                prop_assert_eq!(item.is_available(), item.quantity() > 0);
            }
        }

        #[test]
        fn increase_then_decrease_round_trips(start in 0u32..10_000, amount in 0u32..10_000) {
            let engine = engine();
            let id = seed(&engine, "s-1", start);
            engine.increase(id, amount).unwrap();
            engine.decrease(id, amount, &store_id("s-1")).unwrap();
            prop_assert_eq!(engine.get_by_id(id).unwrap().unwrap().quantity(), start);
        }

        #[test]
        fn decrease_past_stock_never_changes_quantity(start in 0u32..1_000, extra in 1u32..1_000) {
            let engine = engine();
            let id = seed(&engine, "s-1", start);
            let result = engine.decrease_unscoped(id, start + extra);
            prop_assert!(
                matches!(result, Err(EngineError::Domain(DomainError::InsufficientQuantity { .. }))),
                "unexpected result: {:?}",
                result
            );
            prop_assert_eq!(engine.get_by_id(id).unwrap().unwrap().quantity(), start);
        }
    }
}
