//! Store management and the inventory request facade.
//!
//! Store CRUD goes straight to the `StoreRegistry`. Every inventory operation
//! publishes exactly one command and returns a `RequestAck` right away; the
//! result is recorded later by the router under the ack's correlation id.
//!
//! Deleting a store is publish-then-commit: the delete-by-store cascade is put
//! on the delete channel first (retried a bounded number of times) and the
//! store record is only removed once the cascade is on its way. If publishing
//! keeps failing the store is kept, so inventory is never orphaned by a
//! half-finished delete.

use std::thread;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use phonestore_core::{CorrelationId, DomainError, PhoneId, StoreId};
use phonestore_events::{ChannelBus, CommandEnvelope};
use phonestore_inventory::{
    DeleteCommand, InventoryCommand, MutateCommand, OrderBatch, PhoneDraft, PhoneModel, QueryCommand,
};
use phonestore_stores::{Store, StoreDraft, StoreUpdate};

use crate::publisher::{CommandPublisher, PublishError};
use crate::store_registry::{RegistryError, StoreRegistry};

pub const DEFAULT_PUBLISH_RETRIES: usize = 3;

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(25);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("store registry unavailable")]
    Registry,

    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl From<RegistryError> for StoreServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Domain(e) => StoreServiceError::Domain(e),
            RegistryError::Poisoned => StoreServiceError::Registry,
        }
    }
}

pub type StoreServiceResult<T> = Result<T, StoreServiceError>;

/// Acknowledgement for a published inventory request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAck {
    pub status: String,
    pub correlation_id: CorrelationId,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_count: Option<usize>,
}

impl RequestAck {
    fn new(correlation_id: CorrelationId, status: &str, message: &str) -> Self {
        Self {
            status: status.to_string(),
            correlation_id,
            message: message.to_string(),
            store_name: None,
            phone_count: None,
        }
    }
}

pub struct StoreService<R, B> {
    registry: R,
    publisher: CommandPublisher<B>,
    publish_retries: usize,
    retry_backoff: Duration,
}

impl<R, B> StoreService<R, B>
where
    R: StoreRegistry,
    B: ChannelBus<CommandEnvelope>,
{
    pub fn new(registry: R, publisher: CommandPublisher<B>) -> Self {
        Self {
            registry,
            publisher,
            publish_retries: DEFAULT_PUBLISH_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Extra publish attempts for the store-delete cascade.
    pub fn with_publish_retries(mut self, retries: usize) -> Self {
        self.publish_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    // ---- store records

    pub fn create_store(&self, draft: StoreDraft) -> StoreServiceResult<Store> {
        let store = self.registry.create(draft)?;
        tracing::info!(store_id = %store.id_typed(), store_name = %store.store_name(), "store created");
        Ok(store)
    }

    pub fn get_store(&self, id: &StoreId) -> StoreServiceResult<Store> {
        self.registry
            .get(id)?
            .ok_or_else(|| store_not_found(id).into())
    }

    pub fn list_stores(&self) -> StoreServiceResult<Vec<Store>> {
        Ok(self.registry.list()?)
    }

    pub fn update_store(&self, update: StoreUpdate) -> StoreServiceResult<Store> {
        let store = self.registry.update(update)?;
        tracing::info!(store_id = %store.id_typed(), "store updated");
        Ok(store)
    }

    /// Delete a store and cascade-delete its inventory.
    ///
    /// Returns the cascade's correlation id.
    pub fn delete_store(&self, id: &StoreId) -> StoreServiceResult<CorrelationId> {
        self.get_store(id)?;

        let command: InventoryCommand = DeleteCommand::DeleteByStore(id.clone()).into();
        let correlation_id = self.publish_with_retries(&command)?;

        if self.registry.remove(id)?.is_none() {
            // A concurrent delete won the race; the cascade is harmless twice.
            tracing::warn!(store_id = %id, "store vanished before its record was removed");
        }
        tracing::info!(store_id = %id, correlation_id = %correlation_id, "store deleted; inventory cascade published");
        Ok(correlation_id)
    }

    fn publish_with_retries(&self, command: &InventoryCommand) -> Result<CorrelationId, PublishError> {
        let mut attempt = 0;
        loop {
            match self.publisher.publish_command(command) {
                Ok(correlation_id) => return Ok(correlation_id),
                Err(e) if attempt < self.publish_retries => {
                    attempt += 1;
                    tracing::warn!(action = %command.action(), attempt, error = %e, "publish failed; retrying");
                    thread::sleep(self.retry_backoff * attempt as u32);
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ---- inventory requests

    pub fn order_phones(&self, batch: OrderBatch) -> StoreServiceResult<RequestAck> {
        let cid = self.publish(MutateCommand::Order(batch))?;
        Ok(RequestAck::new(
            cid,
            "Order request sent",
            "Phone order placed successfully - quantities will be decreased",
        ))
    }

    pub fn increase_quantity(
        &self,
        phone_id: PhoneId,
        quantity: u32,
        store_id: Option<StoreId>,
    ) -> StoreServiceResult<RequestAck> {
        let cid = self.publish(MutateCommand::Increase {
            phone_id,
            quantity,
            store_id,
        })?;
        Ok(RequestAck::new(
            cid,
            "Increase quantity request sent",
            "Phone quantity will be increased",
        ))
    }

    pub fn decrease_quantity(
        &self,
        phone_id: PhoneId,
        quantity: u32,
        store_id: Option<StoreId>,
    ) -> StoreServiceResult<RequestAck> {
        let cid = self.publish(MutateCommand::Decrease {
            phone_id,
            quantity,
            store_id,
        })?;
        Ok(RequestAck::new(
            cid,
            "Decrease quantity request sent",
            "Phone quantity will be decreased",
        ))
    }

    pub fn get_phone(&self, id: PhoneId) -> StoreServiceResult<RequestAck> {
        let cid = self.publish(QueryCommand::GetById(id))?;
        Ok(RequestAck::new(cid, "Get phone request sent", "Lookup queued"))
    }

    pub fn get_phones(&self, ids: Vec<PhoneId>) -> StoreServiceResult<RequestAck> {
        non_empty(&ids, "ids")?;
        let cid = self.publish(QueryCommand::GetByIds(ids))?;
        Ok(RequestAck::new(cid, "Get phones request sent", "Lookup queued"))
    }

    pub fn get_phones_by_model(&self, model: PhoneModel) -> StoreServiceResult<RequestAck> {
        let cid = self.publish(QueryCommand::GetByModel(model))?;
        Ok(RequestAck::new(cid, "Get phones by model request sent", "Lookup queued"))
    }

    pub fn get_phones_by_models(&self, models: Vec<PhoneModel>) -> StoreServiceResult<RequestAck> {
        non_empty(&models, "models")?;
        let cid = self.publish(QueryCommand::GetByModels(models))?;
        Ok(RequestAck::new(cid, "Get phones by models request sent", "Lookup queued"))
    }

    pub fn catalog(&self) -> StoreServiceResult<RequestAck> {
        let cid = self.publish(QueryCommand::GetAll)?;
        Ok(RequestAck::new(cid, "Get all phones request sent", "Lookup queued"))
    }

    pub fn delete_phone(&self, id: PhoneId) -> StoreServiceResult<RequestAck> {
        let cid = self.publish(DeleteCommand::DeleteById(id))?;
        Ok(RequestAck::new(cid, "Delete phone request sent", "Phone will be deleted"))
    }

    pub fn delete_phones(&self, ids: Vec<PhoneId>) -> StoreServiceResult<RequestAck> {
        non_empty(&ids, "ids")?;
        let cid = self.publish(DeleteCommand::DeleteByIds(ids))?;
        Ok(RequestAck::new(cid, "Delete phones request sent", "Phones will be deleted"))
    }

    /// Queue new stock for an existing store.
    pub fn add_phones(&self, store_id: &StoreId, drafts: Vec<PhoneDraft>) -> StoreServiceResult<RequestAck> {
        self.get_store(store_id)?;
        non_empty(&drafts, "phones")?;

        let phone_count = drafts.len();
        let cid = self.publish(MutateCommand::AddPhones {
            store_id: store_id.clone(),
            drafts,
        })?;
        Ok(RequestAck {
            phone_count: Some(phone_count),
            ..RequestAck::new(cid, "Add phones request sent", "Phones will be added")
        })
    }

    pub fn phones_for_store(&self, store_id: &StoreId) -> StoreServiceResult<RequestAck> {
        let store = self.get_store(store_id)?;
        let cid = self.publish(QueryCommand::GetByStore(store_id.clone()))?;
        Ok(RequestAck {
            store_name: Some(store.store_name().to_string()),
            ..RequestAck::new(cid, "Get phones by store ID request sent", "Lookup queued")
        })
    }

    fn publish(&self, command: impl Into<InventoryCommand>) -> Result<CorrelationId, PublishError> {
        self.publisher.publish_command(&command.into())
    }
}

fn store_not_found(id: &StoreId) -> DomainError {
    DomainError::not_found(format!("Store not found with id: {id}"))
}

fn non_empty<T>(list: &[T], field: &str) -> Result<(), DomainError> {
    if list.is_empty() {
        return Err(DomainError::validation(format!("{field} list cannot be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use phonestore_events::{Channel, InMemoryChannelBus, Subscription};
    use phonestore_inventory::{OrderLine, Price};

    use crate::store_registry::InMemoryStoreRegistry;

    type Bus = Arc<InMemoryChannelBus<CommandEnvelope>>;

    fn service() -> (StoreService<InMemoryStoreRegistry, Bus>, Bus) {
        let bus: Bus = Arc::new(InMemoryChannelBus::new());
        let service = StoreService::new(InMemoryStoreRegistry::new(), CommandPublisher::new(Arc::clone(&bus)));
        (service, bus)
    }

    fn draft(name: &str) -> StoreDraft {
        StoreDraft {
            store_name: name.into(),
            address: "1 Main St".into(),
            manager_name: "Dana".into(),
        }
    }

    fn next(sub: &Subscription<CommandEnvelope>) -> CommandEnvelope {
        sub.recv_timeout(Duration::from_secs(1)).unwrap()
    }

    /// Fails the first `failures` publishes, then forwards to an in-memory bus.
    struct FlakyBus {
        failures: AtomicUsize,
        inner: InMemoryChannelBus<CommandEnvelope>,
    }

    impl ChannelBus<CommandEnvelope> for FlakyBus {
        type Error = String;

        fn publish(&self, channel: Channel, message: CommandEnvelope) -> Result<(), String> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err("broker unavailable".into());
            }
            self.inner.publish(channel, message).map_err(|e| e.to_string())
        }

        fn subscribe(&self, channel: Channel) -> Subscription<CommandEnvelope> {
            self.inner.subscribe(channel)
        }
    }

    fn flaky(failures: usize, retries: usize) -> (StoreService<InMemoryStoreRegistry, Arc<FlakyBus>>, Arc<FlakyBus>) {
        let bus = Arc::new(FlakyBus {
            failures: AtomicUsize::new(failures),
            inner: InMemoryChannelBus::new(),
        });
        let service = StoreService::new(InMemoryStoreRegistry::new(), CommandPublisher::new(Arc::clone(&bus)))
            .with_publish_retries(retries)
            .with_retry_backoff(Duration::ZERO);
        (service, bus)
    }

    #[test]
    fn delete_store_publishes_the_cascade_then_removes_the_record() {
        let (service, bus) = service();
        let deletes = bus.subscribe(Channel::Delete);
        let store = service.create_store(draft("Central")).unwrap();

        let cid = service.delete_store(store.id_typed()).unwrap();

        let env = next(&deletes);
        assert_eq!(env.action(), "DELETE_PHONE_BY_STORE_ID");
        assert_eq!(env.store_id(), Some(store.id_typed()));
        assert_eq!(env.correlation_id(), cid);
        assert!(matches!(
            service.get_store(store.id_typed()),
            Err(StoreServiceError::Domain(DomainError::NotFound(_)))
        ));
    }

    #[test]
    fn delete_of_unknown_store_publishes_nothing() {
        let (service, bus) = service();
        let deletes = bus.subscribe(Channel::Delete);
        let err = service.delete_store(&StoreId::generate()).unwrap_err();
        assert!(matches!(err, StoreServiceError::Domain(DomainError::NotFound(_))));
        assert!(deletes.try_recv().is_err());
    }

    #[test]
    fn cascade_publish_is_retried() {
        let (service, bus) = flaky(2, 3);
        let deletes = bus.subscribe(Channel::Delete);
        let store = service.create_store(draft("Central")).unwrap();

        service.delete_store(store.id_typed()).unwrap();
        assert_eq!(next(&deletes).action(), "DELETE_PHONE_BY_STORE_ID");
        assert!(service.get_store(store.id_typed()).is_err());
    }

    #[test]
    fn store_is_kept_when_the_cascade_cannot_be_published() {
        let (service, _bus) = flaky(10, 2);
        let store = service.create_store(draft("Central")).unwrap();

        let err = service.delete_store(store.id_typed()).unwrap_err();
        assert!(matches!(err, StoreServiceError::Publish(_)));
        assert_eq!(service.get_store(store.id_typed()).unwrap(), store);
    }

    #[test]
    fn add_phones_requires_an_existing_store() {
        let (service, bus) = service();
        let mutate = bus.subscribe(Channel::Mutate);
        let drafts = vec![PhoneDraft {
            model: PhoneModel::Apple,
            price: Price::from_cents(99_900),
            quantity: 3,
        }];

        let err = service.add_phones(&StoreId::generate(), drafts.clone()).unwrap_err();
        assert!(matches!(err, StoreServiceError::Domain(DomainError::NotFound(_))));
        assert!(mutate.try_recv().is_err());

        let store = service.create_store(draft("Central")).unwrap();
        let ack = service.add_phones(store.id_typed(), drafts).unwrap();
        assert_eq!(ack.phone_count, Some(1));

        let env = next(&mutate);
        assert_eq!(env.action(), "ADD_PHONES");
        assert_eq!(env.correlation_id(), ack.correlation_id);
        assert_eq!(env.store_id(), Some(store.id_typed()));
    }

    #[test]
    fn inventory_requests_land_on_their_channels() {
        let (service, bus) = service();
        let query = bus.subscribe(Channel::Query);
        let mutate = bus.subscribe(Channel::Mutate);
        let delete = bus.subscribe(Channel::Delete);
        let store = service.create_store(draft("Central")).unwrap();
        let phone = PhoneId::new();

        let ack = service.phones_for_store(store.id_typed()).unwrap();
        assert_eq!(ack.store_name.as_deref(), Some("Central"));
        assert_eq!(next(&query).action(), "GET_PHONES_BY_STORE_ID");

        service.catalog().unwrap();
        assert_eq!(next(&query).action(), "GET_ALL_PHONES");

        let batch = OrderBatch::new(vec![OrderLine {
            phone_id: phone,
            quantity: 1,
            store_id: store.id_typed().clone(),
        }])
        .unwrap();
        service.order_phones(batch).unwrap();
        assert_eq!(next(&mutate).action(), "ORDER_PHONES");

        service.decrease_quantity(phone, 2, None).unwrap();
        assert_eq!(next(&mutate).action(), "DECREASE_QUANTITY");

        service.delete_phones(vec![phone]).unwrap();
        assert_eq!(next(&delete).action(), "DELETE_PHONES_BY_IDS");
    }

    #[test]
    fn empty_lists_are_rejected_before_publishing() {
        let (service, bus) = service();
        let query = bus.subscribe(Channel::Query);
        let err = service.get_phones(vec![]).unwrap_err();
        assert!(matches!(err, StoreServiceError::Domain(DomainError::Validation(_))));
        assert!(service.delete_phones(vec![]).is_err());
        assert!(query.try_recv().is_err());
    }

    #[test]
    fn ack_serializes_camel_case() {
        let ack = RequestAck::new(CorrelationId::new(), "Order request sent", "queued");
        let v = serde_json::to_value(&ack).unwrap();
        assert_eq!(v["status"], "Order request sent");
        assert!(v.get("correlationId").is_some());
        assert!(v.get("storeName").is_none());
    }
}
