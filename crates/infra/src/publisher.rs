use serde_json::Value as JsonValue;
use thiserror::Error;

use phonestore_core::{CorrelationId, StoreId};
use phonestore_events::{Channel, ChannelBus, CommandEnvelope};
use phonestore_inventory::InventoryCommand;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("publish to {channel} failed: {message}")]
    Transport { channel: Channel, message: String },
}

/// Stamps envelopes and puts them on a channel.
///
/// Publishing is fire-and-forget: the returned correlation id is the only
/// handle the caller gets. Consumer results are recorded elsewhere, keyed by
/// that id.
#[derive(Debug, Clone)]
pub struct CommandPublisher<B> {
    bus: B,
}

impl<B> CommandPublisher<B>
where
    B: ChannelBus<CommandEnvelope>,
{
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Publish a raw action on `channel`.
    ///
    /// Nothing checks that `action` belongs on `channel`; the consumer
    /// re-validates every envelope it receives.
    pub fn publish(
        &self,
        channel: Channel,
        action: &str,
        store_id: Option<StoreId>,
        payload: JsonValue,
    ) -> Result<CorrelationId, PublishError> {
        self.publish_envelope(channel, CommandEnvelope::stamped(action, store_id, payload))
    }

    /// Publish a typed command on the channel its action belongs to.
    pub fn publish_command(&self, command: &InventoryCommand) -> Result<CorrelationId, PublishError> {
        let envelope = command.encode().into_envelope();
        self.publish_envelope(command.channel(), envelope)
    }

    pub fn publish_envelope(
        &self,
        channel: Channel,
        envelope: CommandEnvelope,
    ) -> Result<CorrelationId, PublishError> {
        let correlation_id = envelope.correlation_id();
        let action = envelope.action().to_string();

        self.bus.publish(channel, envelope).map_err(|e| {
            tracing::error!(channel = %channel, action = %action, correlation_id = %correlation_id, error = %e, "publish failed");
            PublishError::Transport {
                channel,
                message: e.to_string(),
            }
        })?;

        tracing::info!(channel = %channel, action = %action, correlation_id = %correlation_id, "command published");
        Ok(correlation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use phonestore_core::PhoneId;
    use phonestore_events::InMemoryChannelBus;
    use phonestore_inventory::{DeleteCommand, QueryCommand};
    use serde_json::json;

    #[test]
    fn typed_commands_land_on_their_own_channel() {
        let bus = Arc::new(InMemoryChannelBus::<CommandEnvelope>::new());
        let query = bus.subscribe(Channel::Query);
        let delete = bus.subscribe(Channel::Delete);
        let publisher = CommandPublisher::new(Arc::clone(&bus));

        let id = PhoneId::new();
        let cid = publisher
            .publish_command(&DeleteCommand::DeleteById(id).into())
            .unwrap();

        let env = delete.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(env.correlation_id(), cid);
        assert_eq!(env.action(), "DELETE_PHONE_BY_ID");
        assert!(query.try_recv().is_err());

        publisher
            .publish_command(&QueryCommand::GetAll.into())
            .unwrap();
        assert_eq!(
            query.recv_timeout(Duration::from_secs(1)).unwrap().action(),
            "GET_ALL_PHONES"
        );
    }

    #[test]
    fn raw_publish_uses_the_requested_channel_verbatim() {
        let bus = Arc::new(InMemoryChannelBus::<CommandEnvelope>::new());
        let mutate = bus.subscribe(Channel::Mutate);
        let publisher = CommandPublisher::new(Arc::clone(&bus));

        let a = publisher
            .publish(Channel::Mutate, "GET_ALL_PHONES", None, json!({}))
            .unwrap();
        let b = publisher
            .publish(Channel::Mutate, "GET_ALL_PHONES", None, json!({}))
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(mutate.recv_timeout(Duration::from_secs(1)).unwrap().correlation_id(), a);
    }
}
