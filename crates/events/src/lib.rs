//! Command envelopes and channel mechanics.
//!
//! This crate is domain-agnostic: it knows about envelopes, the three logical
//! channels, and how messages move between publishers and subscribers. What an
//! action tag *means* lives in `phonestore-inventory`.

pub mod bus;
pub mod channel;
pub mod envelope;
pub mod in_memory_bus;

pub use bus::{ChannelBus, DeliveryAcks, Subscription};
pub use channel::Channel;
pub use envelope::CommandEnvelope;
pub use in_memory_bus::{InMemoryBusError, InMemoryChannelBus};
