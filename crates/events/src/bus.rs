//! Channel publishing/subscription abstraction (mechanics only).
//!
//! A `ChannelBus` moves messages from publishers to the consumers of one of the
//! three logical channels. It makes minimal assumptions:
//!
//! - **Transport-agnostic**: in-memory channels, Redis Streams, a Kafka topic
//! - **At-least-once delivery**: a message may be delivered more than once
//! - **No cross-channel ordering**: a query published after a mutation may be
//!   consumed first
//! - **No reply path**: publishing returns once the message is handed to the
//!   transport; consumer results never travel back through the bus

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration;

use crate::Channel;

/// A subscription to a single channel.
///
/// ## Usage Pattern
///
/// ```ignore
/// let sub = bus.subscribe(Channel::Mutate);
///
/// loop {
///     match sub.recv_timeout(Duration::from_millis(250)) {
///         Ok(envelope) => {
///             router.route(Channel::Mutate, envelope);
///             sub.ack();
///         }
///         Err(RecvTimeoutError::Timeout) => continue,   // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break, // bus closed
///     };
/// }
/// ```
///
/// Subscriptions are meant for a single consuming thread. Call `ack` once a
/// received message has been fully handled; transports that settle messages
/// only after handling use it, others ignore it.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
    acks: Option<DeliveryAcks>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver, acks: None }
    }

    /// A subscription that reports handled messages back through `acks`.
    pub fn with_acks(receiver: Receiver<M>, acks: DeliveryAcks) -> Self {
        Self {
            receiver,
            acks: Some(acks),
        }
    }

    /// Confirm that the last received message has been handled.
    pub fn ack(&self) {
        if let Some(acks) = &self.acks {
            let _ = acks.acks.send(());
        }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Delivery confirmations from a subscription back to its transport.
///
/// The transport keeps the matching `Receiver<()>` and the `closed_flag`;
/// the flag flips to `true` when the subscription is dropped, so a poller can
/// stop without waiting for another message to arrive.
#[derive(Debug)]
pub struct DeliveryAcks {
    acks: Sender<()>,
    closed: Arc<AtomicBool>,
}

impl DeliveryAcks {
    pub fn new(acks: Sender<()>) -> Self {
        Self {
            acks,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl Drop for DeliveryAcks {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Concern-scoped pub/sub abstraction.
///
/// ```text
/// initiator → publish(channel, envelope) → [ query | mutate | delete ] → consumer
/// ```
///
/// `publish()` fails only for transport reasons (lock poisoning, network).
/// Callers decide whether to retry; a retry after an ambiguous failure may
/// deliver the same envelope twice.
///
/// The trait requires `Send + Sync`: publishers on many request threads share
/// one bus.
pub trait ChannelBus<M>: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    fn publish(&self, channel: Channel, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self, channel: Channel) -> Subscription<M>;
}

impl<M, B> ChannelBus<M> for Arc<B>
where
    B: ChannelBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, channel: Channel, message: M) -> Result<(), Self::Error> {
        (**self).publish(channel, message)
    }

    fn subscribe(&self, channel: Channel) -> Subscription<M> {
        (**self).subscribe(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn acks_reach_the_transport() {
        let (tx, rx) = mpsc::channel::<u8>();
        let (ack_tx, ack_rx) = mpsc::channel();
        let sub = Subscription::with_acks(rx, DeliveryAcks::new(ack_tx));

        tx.send(1).unwrap();
        assert_eq!(sub.recv().unwrap(), 1);
        assert!(ack_rx.try_recv().is_err());
        sub.ack();
        assert!(ack_rx.try_recv().is_ok());
    }

    #[test]
    fn dropping_the_subscription_raises_the_closed_flag() {
        let (_tx, rx) = mpsc::channel::<u8>();
        let (ack_tx, ack_rx) = mpsc::channel();
        let acks = DeliveryAcks::new(ack_tx);
        let closed = acks.closed_flag();
        let sub = Subscription::with_acks(rx, acks);

        assert!(!closed.load(Ordering::Acquire));
        drop(sub);
        assert!(closed.load(Ordering::Acquire));
        assert!(matches!(ack_rx.try_recv(), Err(mpsc::TryRecvError::Disconnected)));
    }

    #[test]
    fn plain_subscriptions_ignore_acks() {
        let (tx, rx) = mpsc::channel::<u8>();
        let sub = Subscription::new(rx);
        tx.send(3).unwrap();
        assert_eq!(sub.try_recv().unwrap(), 3);
        sub.ack();
    }
}
