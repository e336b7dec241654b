//! In-memory channel bus for tests/dev.

use std::collections::HashMap;
use std::sync::{Mutex, mpsc};

use thiserror::Error;
use tracing::trace;

use crate::Channel;
use crate::bus::{ChannelBus, Subscription};

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    #[error("in-memory bus lock poisoned")]
    Poisoned,
}

/// In-memory pub/sub bus.
///
/// - No IO / no async
/// - Per-channel fan-out: every subscriber of a channel gets every message
/// - Publishing to a channel nobody listens on silently drops the message
#[derive(Debug)]
pub struct InMemoryChannelBus<M> {
    subscribers: Mutex<HashMap<Channel, Vec<mpsc::Sender<M>>>>,
}

impl<M> InMemoryChannelBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscribers on a channel (as of the last publish).
    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.subscribers
            .lock()
            .map(|subs| subs.get(&channel).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl<M> Default for InMemoryChannelBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }
}

impl<M> ChannelBus<M> for InMemoryChannelBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, channel: Channel, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;

        if let Some(list) = subs.get_mut(&channel) {
            // Drop any dead subscribers while publishing.
            list.retain(|tx| tx.send(message.clone()).is_ok());
            trace!(channel = %channel, subscribers = list.len(), "published");
        }

        Ok(())
    }

    fn subscribe(&self, channel: Channel) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        // If the lock is poisoned, we still return a subscription;
        // it just won't receive messages until the process restarts.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.entry(channel).or_default().push(tx);
        }

        Subscription::new(rx)
    }
}
