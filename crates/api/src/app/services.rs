use std::sync::{Arc, Mutex};

use thiserror::Error;

use phonestore_events::{Channel, ChannelBus, CommandEnvelope, InMemoryBusError, InMemoryChannelBus, Subscription};
use phonestore_infra::{
    config::{BusBackend, ServiceConfig},
    engine::InventoryEngine,
    outcome::InMemoryOutcomeSink,
    publisher::CommandPublisher,
    record_store::InMemoryPhoneStore,
    router::ActionRouter,
    store_registry::InMemoryStoreRegistry,
    store_service::StoreService,
    workers::{ConsumerWorker, WorkerHandle},
};

#[cfg(feature = "redis")]
use phonestore_infra::event_bus::{RedisStreamsChannelBus, RedisStreamsError};

pub type PhoneStore = Arc<InMemoryPhoneStore>;
pub type Engine = InventoryEngine<PhoneStore>;
pub type Stores = StoreService<Arc<InMemoryStoreRegistry>, Arc<AppBus>>;

#[derive(Debug, Error)]
pub enum AppBusError {
    #[error(transparent)]
    Memory(#[from] InMemoryBusError),

    #[cfg(feature = "redis")]
    #[error(transparent)]
    Redis(#[from] RedisStreamsError),
}

/// The channel transport picked at startup.
#[derive(Debug)]
pub enum AppBus {
    Memory(InMemoryChannelBus<CommandEnvelope>),
    #[cfg(feature = "redis")]
    Redis(RedisStreamsChannelBus),
}

impl ChannelBus<CommandEnvelope> for AppBus {
    type Error = AppBusError;

    fn publish(&self, channel: Channel, message: CommandEnvelope) -> Result<(), Self::Error> {
        match self {
            AppBus::Memory(bus) => Ok(bus.publish(channel, message)?),
            #[cfg(feature = "redis")]
            AppBus::Redis(bus) => Ok(bus.publish(channel, message)?),
        }
    }

    fn subscribe(&self, channel: Channel) -> Subscription<CommandEnvelope> {
        match self {
            AppBus::Memory(bus) => bus.subscribe(channel),
            #[cfg(feature = "redis")]
            AppBus::Redis(bus) => bus.subscribe(channel),
        }
    }
}

#[derive(Debug, Error)]
pub enum BootError {
    #[error("PHONESTORE_BUS=redis requires a build with the `redis` feature")]
    RedisUnavailable,

    #[cfg(feature = "redis")]
    #[error("redis bus: {0}")]
    Redis(#[from] RedisStreamsError),

    #[error("failed to start consumer workers: {0}")]
    Workers(#[from] std::io::Error),
}

/// Everything the handlers need, plus the running consumer workers.
pub struct AppServices {
    stores: Stores,
    engine: Arc<Engine>,
    outcomes: Arc<InMemoryOutcomeSink>,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl AppServices {
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Direct engine access for the synchronous `/inventory` surface.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn outcomes(&self) -> &InMemoryOutcomeSink {
        &self.outcomes
    }

    /// Stop every consumer worker and wait for them to finish.
    pub fn shutdown(&self) {
        let workers = match self.workers.lock() {
            Ok(mut w) => std::mem::take(&mut *w),
            Err(_) => return,
        };
        for w in workers {
            let channel = w.channel();
            w.shutdown();
            tracing::info!(channel = %channel, "consumer worker joined");
        }
    }
}

pub fn build_services(config: &ServiceConfig) -> Result<AppServices, BootError> {
    let bus = Arc::new(build_bus(config)?);

    let engine = Arc::new(InventoryEngine::new(Arc::new(InMemoryPhoneStore::new())));
    let outcomes = Arc::new(InMemoryOutcomeSink::new(config.outcome_capacity));
    let router = Arc::new(ActionRouter::new(Arc::clone(&engine), Arc::clone(&outcomes)));

    // Background consumers: bus -> router -> engine
    let workers = ConsumerWorker::spawn_all(&bus, router)?;

    let stores = StoreService::new(
        Arc::new(InMemoryStoreRegistry::new()),
        CommandPublisher::new(bus),
    )
    .with_publish_retries(config.publish_retries);

    tracing::info!(
        bus = ?config.bus,
        consumer_group = %config.consumer_group,
        consumer_name = %config.consumer_name,
        outcome_capacity = config.outcome_capacity,
        "services ready"
    );

    Ok(AppServices {
        stores,
        engine,
        outcomes,
        workers: Mutex::new(workers),
    })
}

fn build_bus(config: &ServiceConfig) -> Result<AppBus, BootError> {
    match config.bus {
        BusBackend::Memory => Ok(AppBus::Memory(InMemoryChannelBus::new())),
        #[cfg(feature = "redis")]
        BusBackend::Redis => {
            let bus = RedisStreamsChannelBus::new(&config.redis_url, config.consumer_group.clone())?
                .with_consumer_name(config.consumer_name.clone());
            Ok(AppBus::Redis(bus))
        }
        #[cfg(not(feature = "redis"))]
        BusBackend::Redis => Err(BootError::RedisUnavailable),
    }
}
