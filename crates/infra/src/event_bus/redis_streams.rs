//! Redis Streams-backed channel bus (durable, at-least-once delivery).
//!
//! - **One stream per channel**: `phonestore:phone-inventory-get`, ...
//! - **Consumer groups**: every service instance set shares one group, so an
//!   envelope is handled by one consumer of the group
//! - **Ack after handling**: an entry is acknowledged only once the local
//!   subscriber has acked it; anything else stays in the consumer's pending
//!   list and is replayed when the poller (re)connects under the same name
//! - **Stable consumer names**: one name per service instance, so a restart
//!   picks up what the previous run left pending
//! - **Dead-letter stream**: entries whose body is not a valid envelope are
//!   copied to `<stream>:dlq` and acknowledged

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use redis::streams::{StreamId, StreamReadReply};
use tracing::{debug, error, instrument, warn};

use phonestore_events::{Channel, ChannelBus, CommandEnvelope, DeliveryAcks, Subscription};

const DEFAULT_KEY_PREFIX: &str = "phonestore";

/// XREADGROUP start ids: the consumer's own pending list, then new entries.
const PENDING_START: &str = "0";
const NEW_ENTRIES: &str = ">";

/// Entries fetched per XREADGROUP call.
const READ_COUNT: usize = 10;

/// How long XREADGROUP blocks waiting for new entries.
const READ_BLOCK_MS: u64 = 100;

/// Back-off after a failed read before polling again.
const ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// How often a poller waiting for an ack re-checks its subscription.
const ACK_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum RedisStreamsError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis command error: {0}")]
    Command(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

#[derive(Debug, Clone)]
pub struct RedisStreamsChannelBus {
    client: Arc<redis::Client>,
    key_prefix: String,
    group_name: String,
    consumer_name: String,
}

impl RedisStreamsChannelBus {
    /// Create a bus consuming as `group_name`.
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `group_name` - consumer group shared by every instance of the service
    pub fn new(redis_url: impl AsRef<str>, group_name: impl Into<String>) -> Result<Self, RedisStreamsError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            group_name: group_name.into(),
            consumer_name: crate::config::DEFAULT_CONSUMER_NAME.to_string(),
        })
    }

    /// Name this instance consumes under. Must be unique per instance and
    /// stable across restarts.
    pub fn with_consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = name.into();
        self
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn stream_key(&self, channel: Channel) -> String {
        format!("{}:{}", self.key_prefix, channel.topic())
    }

    pub fn dlq_key(&self, channel: Channel) -> String {
        format!("{}:dlq", self.stream_key(channel))
    }

    fn connection(&self) -> Result<redis::Connection, RedisStreamsError> {
        self.client
            .get_connection()
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))
    }

    /// Ensure the consumer group exists on the channel's stream (idempotent).
    pub fn ensure_consumer_group(&self, channel: Channel) -> Result<(), RedisStreamsError> {
        let mut conn = self.connection()?;

        // MKSTREAM creates the stream if needed; an existing group answers
        // BUSYGROUP, which is fine.
        let created: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(self.stream_key(channel))
            .arg(&self.group_name)
            .arg("0")
            .arg("MKSTREAM")
            .query(&mut conn);

        match created {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(RedisStreamsError::Command(format!("XGROUP CREATE failed: {e}"))),
        }
    }

    #[instrument(
        skip(self, envelope),
        fields(
            channel = %channel,
            action = %envelope.action(),
            correlation_id = %envelope.correlation_id()
        ),
        err
    )]
    fn publish_sync(&self, channel: Channel, envelope: &CommandEnvelope) -> Result<(), RedisStreamsError> {
        let body = envelope
            .to_json()
            .map_err(|e| RedisStreamsError::Serialization(e.to_string()))?;
        let mut conn = self.connection()?;

        let _: String = redis::cmd("XADD")
            .arg(self.stream_key(channel))
            .arg("*")
            .arg("action")
            .arg(envelope.action())
            .arg("correlation_id")
            .arg(envelope.correlation_id().to_string())
            .arg("envelope")
            .arg(&body)
            .query(&mut conn)
            .map_err(|e| RedisStreamsError::Command(format!("XADD failed: {e}")))?;

        Ok(())
    }

    fn read_group_sync(
        &self,
        conn: &mut redis::Connection,
        channel: Channel,
        consumer_name: &str,
        start: &str,
    ) -> Result<Vec<StreamId>, RedisStreamsError> {
        let reply: StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group_name)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(READ_COUNT)
            .arg("BLOCK")
            .arg(READ_BLOCK_MS)
            .arg("STREAMS")
            .arg(self.stream_key(channel))
            .arg(start)
            .query(conn)
            .map_err(|e| RedisStreamsError::Command(format!("XREADGROUP failed: {e}")))?;

        Ok(reply.keys.into_iter().flat_map(|k| k.ids).collect())
    }

    fn acknowledge_sync(
        &self,
        conn: &mut redis::Connection,
        channel: Channel,
        entry_id: &str,
    ) -> Result<(), RedisStreamsError> {
        let _: u64 = redis::cmd("XACK")
            .arg(self.stream_key(channel))
            .arg(&self.group_name)
            .arg(entry_id)
            .query(conn)
            .map_err(|e| RedisStreamsError::Command(format!("XACK failed: {e}")))?;
        Ok(())
    }

    fn send_to_dlq_sync(
        &self,
        conn: &mut redis::Connection,
        channel: Channel,
        entry: &StreamId,
        reason: &str,
    ) -> Result<(), RedisStreamsError> {
        let body: String = entry.get("envelope").unwrap_or_default();

        let _: String = redis::cmd("XADD")
            .arg(self.dlq_key(channel))
            .arg("*")
            .arg("original_entry_id")
            .arg(&entry.id)
            .arg("reason")
            .arg(reason)
            .arg("failed_at")
            .arg(chrono::Utc::now().to_rfc3339())
            .arg("envelope")
            .arg(&body)
            .query(conn)
            .map_err(|e| RedisStreamsError::Command(format!("DLQ XADD failed: {e}")))?;

        warn!(channel = %channel, entry_id = %entry.id, reason, "entry moved to dead-letter stream");
        Ok(())
    }

    /// Subscribe `consumer_name` within the bus's consumer group.
    ///
    /// A background thread polls the stream and forwards decoded envelopes;
    /// it stops when the returned subscription is dropped.
    pub fn subscribe_as(&self, channel: Channel, consumer_name: &str) -> Subscription<CommandEnvelope> {
        if let Err(e) = self.ensure_consumer_group(channel) {
            error!(channel = %channel, group = %self.group_name, error = %e, "failed to create consumer group");
        }

        match self.spawn_poller(channel, consumer_name) {
            Ok((sub, _poller)) => sub,
            Err(e) => {
                error!(channel = %channel, error = %e, "failed to spawn stream poller");
                // Closed subscription: the worker sees a disconnect and stops.
                Subscription::new(mpsc::channel().1)
            }
        }
    }

    fn spawn_poller(
        &self,
        channel: Channel,
        consumer_name: &str,
    ) -> std::io::Result<(Subscription<CommandEnvelope>, thread::JoinHandle<()>)> {
        let (tx, rx) = mpsc::channel();
        let (ack_tx, ack_rx) = mpsc::channel();
        let acks = DeliveryAcks::new(ack_tx);
        let poller = Poller {
            bus: self.clone(),
            channel,
            consumer_name: consumer_name.to_string(),
            tx,
            acks: ack_rx,
            closed: acks.closed_flag(),
        };

        let join = thread::Builder::new()
            .name(format!("redis-{}", channel.topic()))
            .spawn(move || poller.run())?;

        Ok((Subscription::with_acks(rx, acks), join))
    }
}

/// Outcome of handing one entry to the subscriber.
enum Handoff {
    Acked,
    Closed,
}

/// The polling side of one subscription.
struct Poller {
    bus: RedisStreamsChannelBus,
    channel: Channel,
    consumer_name: String,
    tx: mpsc::Sender<CommandEnvelope>,
    acks: mpsc::Receiver<()>,
    closed: Arc<AtomicBool>,
}

impl Poller {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Read, hand off, wait for the subscriber's ack, then XACK.
    ///
    /// After every (re)connect the consumer's own pending list is replayed
    /// first (`0`), then new entries are read (`>`). An entry is never
    /// acknowledged before the subscriber has handled it.
    fn run(self) {
        let channel = self.channel;
        let mut conn: Option<redis::Connection> = None;
        let mut replaying = true;

        while !self.is_closed() {
            if conn.is_none() {
                match self.bus.connection() {
                    Ok(c) => {
                        conn = Some(c);
                        replaying = true;
                    }
                    Err(e) => {
                        error!(channel = %channel, error = %e, "stream poller cannot connect");
                        thread::sleep(ERROR_BACKOFF);
                        continue;
                    }
                }
            }
            let Some(c) = conn.as_mut() else {
                continue;
            };

            let start = if replaying { PENDING_START } else { NEW_ENTRIES };
            let entries = match self.bus.read_group_sync(c, channel, &self.consumer_name, start) {
                Ok(entries) => entries,
                Err(e) => {
                    error!(channel = %channel, error = %e, "failed to read from stream");
                    conn = None;
                    thread::sleep(ERROR_BACKOFF);
                    continue;
                }
            };

            if replaying {
                if entries.is_empty() {
                    replaying = false;
                    continue;
                }
                debug!(channel = %channel, pending = entries.len(), "replaying pending entries");
            }

            for entry in entries {
                match decode_entry(&entry) {
                    Ok(envelope) => match self.hand_off(envelope) {
                        Handoff::Acked => {}
                        Handoff::Closed => {
                            // Left pending; replayed on the next start.
                            debug!(channel = %channel, entry_id = %entry.id, "subscription dropped; stream poller stopping");
                            return;
                        }
                    },
                    Err(e) => {
                        if let Err(dlq) = self.bus.send_to_dlq_sync(c, channel, &entry, &e.to_string()) {
                            error!(channel = %channel, error = %dlq, "failed to dead-letter entry");
                            continue;
                        }
                    }
                }

                if let Err(e) = self.bus.acknowledge_sync(c, channel, &entry.id) {
                    error!(channel = %channel, entry_id = %entry.id, error = %e, "failed to acknowledge entry");
                }
            }
        }

        debug!(channel = %channel, "subscription dropped; stream poller stopping");
    }

    fn hand_off(&self, envelope: CommandEnvelope) -> Handoff {
        if self.tx.send(envelope).is_err() {
            return Handoff::Closed;
        }
        loop {
            match self.acks.recv_timeout(ACK_WAIT) {
                Ok(()) => return Handoff::Acked,
                Err(mpsc::RecvTimeoutError::Timeout) if !self.is_closed() => continue,
                Err(_) => return Handoff::Closed,
            }
        }
    }
}

/// Decode the envelope stored in a stream entry.
fn decode_entry(entry: &StreamId) -> Result<CommandEnvelope, RedisStreamsError> {
    let body: String = entry
        .get("envelope")
        .ok_or_else(|| RedisStreamsError::Deserialization("missing envelope field".to_string()))?;

    CommandEnvelope::from_json(body.as_bytes())
        .map_err(|e| RedisStreamsError::Deserialization(format!("invalid envelope: {e}")))
}

impl ChannelBus<CommandEnvelope> for RedisStreamsChannelBus {
    type Error = RedisStreamsError;

    fn publish(&self, channel: Channel, message: CommandEnvelope) -> Result<(), Self::Error> {
        self.publish_sync(channel, &message)
    }

    fn subscribe(&self, channel: Channel) -> Subscription<CommandEnvelope> {
        let consumer_name = self.consumer_name.clone();
        self.subscribe_as(channel, &consumer_name)
    }
}
