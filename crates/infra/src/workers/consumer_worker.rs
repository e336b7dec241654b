use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use phonestore_events::{Channel, ChannelBus, CommandEnvelope, Subscription};

use crate::outcome::OutcomeSink;
use crate::record_store::PhoneRecordStore;
use crate::router::ActionRouter;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    channel: Channel,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Channel consumer loop.
///
/// - Subscribes to one channel of a bus
/// - Hands every envelope to the router, one at a time, and acks it once
///   routed (a contained panic counts as routed)
/// - A panicking handler is caught and recorded; the loop keeps going
/// - Supports graceful shutdown
#[derive(Debug)]
pub struct ConsumerWorker;

impl ConsumerWorker {
    /// Spawn a worker thread consuming `channel`.
    ///
    /// The subscription is taken before the thread starts, so nothing
    /// published after `spawn` returns is missed.
    pub fn spawn<B, S, O>(
        channel: Channel,
        bus: &B,
        router: Arc<ActionRouter<S, O>>,
    ) -> io::Result<WorkerHandle>
    where
        B: ChannelBus<CommandEnvelope>,
        S: PhoneRecordStore + 'static,
        O: OutcomeSink + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe(channel);

        let join = thread::Builder::new()
            .name(format!("consumer-{}", channel.topic()))
            .spawn(move || worker_loop(channel, sub, shutdown_rx, &router))?;

        info!(channel = %channel, "consumer worker started");
        Ok(WorkerHandle {
            channel,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }

    /// One worker per channel.
    pub fn spawn_all<B, S, O>(
        bus: &B,
        router: Arc<ActionRouter<S, O>>,
    ) -> io::Result<Vec<WorkerHandle>>
    where
        B: ChannelBus<CommandEnvelope>,
        S: PhoneRecordStore + 'static,
        O: OutcomeSink + 'static,
    {
        Channel::ALL
            .into_iter()
            .map(|channel| Self::spawn(channel, bus, Arc::clone(&router)))
            .collect()
    }
}

fn worker_loop<S, O>(
    channel: Channel,
    sub: Subscription<CommandEnvelope>,
    shutdown_rx: mpsc::Receiver<()>,
    router: &ActionRouter<S, O>,
) where
    S: PhoneRecordStore,
    O: OutcomeSink,
{
    let tick = Duration::from_millis(250);

    loop {
        // Shutdown check (non-blocking)
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(envelope) => {
                handle(channel, router, &envelope);
                sub.ack();
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(channel = %channel, "consumer worker stopped");
}

fn handle<S, O>(channel: Channel, router: &ActionRouter<S, O>, envelope: &CommandEnvelope)
where
    S: PhoneRecordStore,
    O: OutcomeSink,
{
    let result = panic::catch_unwind(AssertUnwindSafe(|| router.route(channel, envelope)));
    if let Err(payload) = result {
        let message = panic_message(payload.as_ref());
        error!(
            channel = %channel,
            action = %envelope.action(),
            correlation_id = %envelope.correlation_id(),
            panic = %message,
            "handler panicked; envelope contained"
        );
        router.record_panic(channel, envelope, &message);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
