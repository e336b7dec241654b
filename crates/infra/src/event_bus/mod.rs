//! Infrastructure channel bus implementations.
//!
//! The channel bus abstraction lives in `phonestore-events` as pure mechanics
//! (with an in-memory bus for tests and single-process runs). This module
//! provides the Redis Streams transport.

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::{RedisStreamsChannelBus, RedisStreamsError};
