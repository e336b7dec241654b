//! Action router: the consumer side of the inventory channels.
//!
//! ```text
//! envelope ─→ decode (tag + payload shape, per channel)
//!               │ ok                       │ err
//!               ↓                          ↓
//!            engine call               Rejected outcome
//!               │                          │
//!               └──→ RouteOutcome ←────────┘
//!                        │
//!                 log + OutcomeSink (+ dead letter when Rejected)
//! ```
//!
//! `route` never fails and never panics on bad input: unknown tags,
//! malformed payloads and engine errors all become a contained failure on
//! the outcome, and routing carries on with the next envelope.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, info_span, warn};

use phonestore_events::{Channel, CommandEnvelope};
use phonestore_inventory::{
    DeleteCommand, InventoryCommand, MutateCommand, OrderBatch, PhoneDraft, PhoneInventoryItem,
    QueryCommand,
};

use phonestore_core::{PhoneId, StoreId};

use crate::engine::{EngineResult, InventoryEngine};
use crate::outcome::{
    ContainedFailure, DeadLetter, FailureKind, OutcomeSink, OutcomeStatus, RouteOutcome,
};
use crate::record_store::PhoneRecordStore;

#[derive(Debug)]
pub struct ActionRouter<S, O> {
    engine: Arc<InventoryEngine<S>>,
    sink: O,
}

impl<S, O> ActionRouter<S, O>
where
    S: PhoneRecordStore,
    O: OutcomeSink,
{
    pub fn new(engine: Arc<InventoryEngine<S>>, sink: O) -> Self {
        Self { engine, sink }
    }

    pub fn engine(&self) -> &InventoryEngine<S> {
        &self.engine
    }

    /// Route one envelope received on `channel`.
    pub fn route(&self, channel: Channel, envelope: &CommandEnvelope) -> RouteOutcome {
        let span = info_span!(
            "route",
            channel = %channel,
            action = %envelope.action(),
            correlation_id = %envelope.correlation_id(),
        );
        let _entered = span.enter();

        debug!(store_id = ?envelope.store_id(), payload = %envelope.payload(), "envelope received");

        let outcome = match InventoryCommand::decode(channel, envelope) {
            Ok(command) => self.execute(channel, envelope, command),
            Err(err) => {
                warn!(error = %err, "envelope rejected at decode");
                RouteOutcome::rejected(channel, envelope, ContainedFailure::from(&err))
            }
        };

        self.finish(channel, envelope, outcome)
    }

    /// Record an envelope whose handling panicked.
    pub fn record_panic(&self, channel: Channel, envelope: &CommandEnvelope, message: &str) -> RouteOutcome {
        let failure = ContainedFailure::new(FailureKind::Panicked, message);
        self.finish(channel, envelope, RouteOutcome::rejected(channel, envelope, failure))
    }

    fn finish(&self, channel: Channel, envelope: &CommandEnvelope, outcome: RouteOutcome) -> RouteOutcome {
        match outcome.status {
            OutcomeStatus::Completed => {
                info!(items = outcome.items.len(), "envelope processed")
            }
            OutcomeStatus::Partial => warn!(
                items = outcome.items.len(),
                failures = outcome.failures.len(),
                "envelope partially applied"
            ),
            OutcomeStatus::Rejected => warn!(
                failures = outcome.failures.len(),
                first = outcome.failures.first().map(|f| f.message.as_str()).unwrap_or(""),
                "envelope rejected"
            ),
        }

        self.sink.record(&outcome);
        if outcome.is_rejected() {
            self.sink.dead_letter(DeadLetter {
                channel,
                envelope: envelope.clone(),
                failures: outcome.failures.clone(),
                recorded_at: Utc::now(),
            });
        }
        outcome
    }

    fn execute(&self, channel: Channel, envelope: &CommandEnvelope, command: InventoryCommand) -> RouteOutcome {
        let result = match command {
            InventoryCommand::Query(query) => self.query(query),
            InventoryCommand::Mutate(mutation) => match mutation {
                // Orders apply line by line and build their own outcome.
                MutateCommand::Order(batch) => return self.order(channel, envelope, &batch),
                MutateCommand::AddPhones { store_id, drafts } => self.add_phones(store_id, drafts),
                MutateCommand::Increase {
                    phone_id,
                    quantity,
                    store_id,
                } => self.increase(phone_id, quantity, store_id.as_ref()),
                MutateCommand::Decrease {
                    phone_id,
                    quantity,
                    store_id,
                } => self.decrease(phone_id, quantity, store_id.as_ref()),
            },
            InventoryCommand::Delete(delete) => self.delete(delete),
        };

        match result {
            Ok(items) => RouteOutcome::completed(channel, envelope, items),
            Err(err) => {
                warn!(error = %err, "handler failed");
                RouteOutcome::rejected(channel, envelope, ContainedFailure::from(&err))
            }
        }
    }

    fn query(&self, query: QueryCommand) -> EngineResult<Vec<PhoneInventoryItem>> {
        match query {
            QueryCommand::GetById(id) => Ok(self.engine.get_by_id(id)?.into_iter().collect()),
            QueryCommand::GetByIds(ids) => self.engine.get_by_ids(&ids),
            QueryCommand::GetByModel(model) => self.engine.get_by_model(model),
            QueryCommand::GetByModels(models) => self.engine.get_by_models(&models),
            QueryCommand::GetAll => self.engine.get_all(),
            QueryCommand::GetByStore(store_id) => self.engine.get_by_store(&store_id),
        }
    }

    fn add_phones(&self, store_id: StoreId, drafts: Vec<PhoneDraft>) -> EngineResult<Vec<PhoneInventoryItem>> {
        let added = self.engine.add_batch(drafts, Some(store_id))?;
        info!(added = added.len(), "phones added");
        Ok(added)
    }

    fn increase(
        &self,
        phone_id: PhoneId,
        quantity: u32,
        store_id: Option<&StoreId>,
    ) -> EngineResult<Vec<PhoneInventoryItem>> {
        let updated = self.engine.increase(phone_id, quantity)?;
        if updated.is_none() {
            debug!(phone_id = %phone_id, "no phone to increase");
        }
        self.snapshot(store_id, updated)
    }

    fn decrease(
        &self,
        phone_id: PhoneId,
        quantity: u32,
        store_id: Option<&StoreId>,
    ) -> EngineResult<Vec<PhoneInventoryItem>> {
        let updated = self.engine.decrease_unscoped(phone_id, quantity)?;
        if updated.is_none() {
            debug!(phone_id = %phone_id, "no phone to decrease");
        }
        self.snapshot(store_id, updated)
    }

    /// The store's current stock when the command is store-scoped, otherwise
    /// just the item that changed.
    fn snapshot(
        &self,
        store_id: Option<&StoreId>,
        updated: Option<PhoneInventoryItem>,
    ) -> EngineResult<Vec<PhoneInventoryItem>> {
        match store_id {
            Some(store_id) => self.engine.get_by_store(store_id),
            None => Ok(updated.into_iter().collect()),
        }
    }

    /// Apply an order batch line by line. A rejected line does not undo or
    /// stop the others.
    fn order(&self, channel: Channel, envelope: &CommandEnvelope, batch: &OrderBatch) -> RouteOutcome {
        let (items, failures, applied) = self.order_lines(batch);

        let status = match (failures.is_empty(), applied) {
            (true, _) => OutcomeStatus::Completed,
            (false, 0) => OutcomeStatus::Rejected,
            (false, _) => OutcomeStatus::Partial,
        };
        let items = if status == OutcomeStatus::Rejected {
            Vec::new()
        } else {
            items
        };
        RouteOutcome::build(channel, envelope, status, items, failures)
    }

    fn order_lines(&self, batch: &OrderBatch) -> (Vec<PhoneInventoryItem>, Vec<ContainedFailure>, usize) {
        let mut failures: Vec<ContainedFailure> = batch
            .skipped()
            .iter()
            .map(|s| ContainedFailure::new(FailureKind::PayloadShape, s.reason.clone()).at_line(s.index))
            .collect();
        let mut applied = 0usize;

        for (index, line) in batch.indexed_lines() {
            match self.engine.decrease(line.phone_id, line.quantity, &line.store_id) {
                Ok(Some(item)) => {
                    applied += 1;
                    debug!(line = index, phone_id = %line.phone_id, quantity = item.quantity(), "order line applied");
                }
                Ok(None) => {
                    warn!(line = index, phone_id = %line.phone_id, store_id = %line.store_id, "order line matches no stocked phone");
                    failures.push(
                        ContainedFailure::new(
                            FailureKind::NotFound,
                            format!("phone {} is not stocked by store {}", line.phone_id, line.store_id),
                        )
                        .at_line(index),
                    );
                }
                Err(err) => {
                    warn!(line = index, phone_id = %line.phone_id, error = %err, "order line rejected");
                    failures.push(ContainedFailure::from(&err).at_line(index));
                }
            }
        }

        let items = match self.engine.get_by_store(batch.snapshot_store()) {
            Ok(items) => items,
            Err(err) => {
                failures.push(ContainedFailure::from(&err));
                Vec::new()
            }
        };
        (items, failures, applied)
    }

    fn delete(&self, delete: DeleteCommand) -> EngineResult<Vec<PhoneInventoryItem>> {
        match delete {
            DeleteCommand::DeleteById(id) => {
                let removed = self.engine.delete_one(id)?;
                info!(phone_id = %id, removed, "delete by id");
            }
            DeleteCommand::DeleteByIds(ids) => {
                let removed = self.engine.delete_many(&ids)?;
                info!(removed, "delete by ids");
            }
            DeleteCommand::DeleteByStore(store_id) => {
                let removed = self.engine.delete_by_store(&store_id)?;
                info!(store_id = %store_id, removed, "store inventory removed");
            }
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value as JsonValue, json};

    use phonestore_inventory::{PhoneModel, Price};

    use crate::outcome::InMemoryOutcomeSink;
    use crate::record_store::InMemoryPhoneStore;

    type Router = ActionRouter<Arc<InMemoryPhoneStore>, Arc<InMemoryOutcomeSink>>;

    fn router() -> (Router, Arc<InMemoryOutcomeSink>) {
        let engine = Arc::new(InventoryEngine::new(Arc::new(InMemoryPhoneStore::new())));
        let sink = Arc::new(InMemoryOutcomeSink::new(64));
        (ActionRouter::new(engine, Arc::clone(&sink)), sink)
    }

    fn seed(router: &Router, store: &str, quantity: u32) -> PhoneId {
        router
            .engine()
            .add_batch(
                vec![PhoneDraft {
                    model: PhoneModel::Samsung,
                    price: Price::from_cents(30_000),
                    quantity,
                }],
                Some(store.parse().unwrap()),
            )
            .unwrap()[0]
            .id_typed()
    }

    fn env(action: &str, store: Option<&str>, payload: JsonValue) -> CommandEnvelope {
        CommandEnvelope::stamped(action, store.map(|s| s.parse().unwrap()), payload)
    }

    #[test]
    fn unknown_tag_yields_empty_result_and_no_mutation() {
        let (router, sink) = router();
        let id = seed(&router, "s-1", 4);

        for channel in Channel::ALL {
            let e = env("EXPLODE", None, json!({"phoneId": id}));
            let outcome = router.route(channel, &e);
            assert!(outcome.is_rejected());
            assert!(outcome.items.is_empty());
            assert_eq!(outcome.failures[0].kind, FailureKind::UnknownAction);
        }
        assert_eq!(router.engine().get_by_id(id).unwrap().unwrap().quantity(), 4);
        assert_eq!(sink.dead_letters().len(), 3);
    }

    #[test]
    fn lookup_by_ids_returns_matches_despite_malformed_ids() {
        let (router, sink) = router();
        let a = seed(&router, "s-1", 2);

        let e = env("GET_PHONES_BY_IDS", None, json!({"phoneIds": [a, "legacy-id"]}));
        let outcome = router.route(Channel::Query, &e);
        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].id_typed(), a);
        assert!(sink.dead_letters().is_empty());
    }

    #[test]
    fn misrouted_tag_is_not_executed() {
        let (router, _) = router();
        let id = seed(&router, "s-1", 4);
        let outcome = router.route(Channel::Query, &env("DELETE_PHONE_BY_ID", None, json!({"phoneId": id})));
        assert_eq!(outcome.failures[0].kind, FailureKind::Misrouted);
        assert!(router.engine().get_by_id(id).unwrap().is_some());
    }

    #[test]
    fn get_by_id_returns_zero_or_one_item() {
        let (router, _) = router();
        let id = seed(&router, "s-1", 1);
        let hit = router.route(Channel::Query, &env("GET_PHONE_BY_ID", None, json!({"phoneId": id})));
        assert_eq!(hit.items.len(), 1);
        let miss = router.route(
            Channel::Query,
            &env("GET_PHONE_BY_ID", None, json!({"phoneId": PhoneId::new()})),
        );
        assert_eq!(miss.status, OutcomeStatus::Completed);
        assert!(miss.items.is_empty());
    }

    #[test]
    fn order_batch_applies_lines_independently() {
        let (router, sink) = router();
        let a = seed(&router, "s-1", 5);
        let b = seed(&router, "s-1", 3);

        let e = env(
            "ORDER_PHONES",
            Some("s-1"),
            json!({"orders": [
                {"phoneId": a, "quantity": 2, "storeId": "s-1"},
                {"phoneId": b, "quantity": 999_999, "storeId": "s-1"},
            ]}),
        );
        let outcome = router.route(Channel::Mutate, &e);

        assert_eq!(outcome.status, OutcomeStatus::Partial);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, FailureKind::InsufficientQuantity);
        assert_eq!(outcome.failures[0].line, Some(1));
        assert_eq!(router.engine().get_by_id(a).unwrap().unwrap().quantity(), 3);
        assert_eq!(router.engine().get_by_id(b).unwrap().unwrap().quantity(), 3);
        // Snapshot of the first line's store.
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(sink.outcome(e.correlation_id()).unwrap().status, OutcomeStatus::Partial);
        assert!(sink.dead_letters().is_empty());
    }

    #[test]
    fn order_line_for_another_store_is_a_contained_not_found() {
        let (router, _) = router();
        let a = seed(&router, "s-1", 5);
        let e = env(
            "ORDER_PHONES",
            Some("s-2"),
            json!({"orders": [{"phoneId": a, "quantity": 1, "storeId": "s-2"}]}),
        );
        let outcome = router.route(Channel::Mutate, &e);
        assert_eq!(outcome.status, OutcomeStatus::Rejected);
        assert_eq!(outcome.failures[0].kind, FailureKind::NotFound);
        assert_eq!(router.engine().get_by_id(a).unwrap().unwrap().quantity(), 5);
    }

    #[test]
    fn decrease_beyond_stock_is_contained() {
        let (router, sink) = router();
        let a = seed(&router, "s-1", 2);
        let e = env("DECREASE_QUANTITY", None, json!({"phoneId": a, "quantity": 3}));
        let outcome = router.route(Channel::Mutate, &e);
        assert!(outcome.is_rejected());
        assert_eq!(outcome.failures[0].kind, FailureKind::InsufficientQuantity);
        assert_eq!(router.engine().get_by_id(a).unwrap().unwrap().quantity(), 2);
        assert_eq!(sink.dead_letters()[0].envelope, e);
    }

    #[test]
    fn increase_returns_store_snapshot_when_scoped() {
        let (router, _) = router();
        let a = seed(&router, "s-1", 0);
        seed(&router, "s-1", 7);
        let outcome = router.route(
            Channel::Mutate,
            &env("INCREASE_QUANTITY", Some("s-1"), json!({"phoneId": a, "quantity": 3})),
        );
        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert_eq!(outcome.items.len(), 2);

        let outcome = router.route(
            Channel::Mutate,
            &env("INCREASE_QUANTITY", None, json!({"phoneId": a, "quantity": 1})),
        );
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].quantity(), 4);
        assert!(outcome.items[0].is_available());
    }

    #[test]
    fn add_phones_then_delete_by_store() {
        let (router, _) = router();
        let add = env(
            "ADD_PHONES",
            Some("s-3"),
            json!([
                {"model": "APPLE", "price": 999.0, "quantity": 1},
                {"model": "xiaomi", "price": 199.5, "quantity": 0},
            ]),
        );
        let outcome = router.route(Channel::Mutate, &add);
        assert_eq!(outcome.items.len(), 2);
        assert!(!outcome.items[1].is_available());

        let del = env("DELETE_PHONE_BY_STORE_ID", Some("s-3"), JsonValue::Null);
        assert_eq!(router.route(Channel::Delete, &del).status, OutcomeStatus::Completed);
        assert!(router.engine().get_all().unwrap().is_empty());

        // Second cascade finds nothing.
        let again = env("DELETE_PHONE_BY_STORE_ID", Some("s-3"), JsonValue::Null);
        let outcome = router.route(Channel::Delete, &again);
        assert_eq!(outcome.failures[0].kind, FailureKind::NotFound);
    }

    #[test]
    fn delete_by_ids_reports_missing_and_keeps_existing() {
        let (router, _) = router();
        let a = seed(&router, "s-1", 1);
        let e = env("DELETE_PHONES_BY_IDS", None, json!({"phoneIds": [a, PhoneId::new()]}));
        let outcome = router.route(Channel::Delete, &e);
        assert_eq!(outcome.failures[0].kind, FailureKind::NotFound);
        assert!(router.engine().get_by_id(a).unwrap().is_some());
    }
}
