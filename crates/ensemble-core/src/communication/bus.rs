//! In-process message bus with per-destination ordered delivery.
//!
//! Every subscribed agent id owns one FIFO queue drained by a single task, so
//! messages to the same destination are handled strictly in publish order.
//! Broadcasts enqueue one copy per destination.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use super::error::{CommError, CommResult};
use super::hooks::EventHooks;
use super::memory::SharedMemory;
use super::message::Message;
use crate::obs;

/// Receives messages addressed to a subscribed agent.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message);
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn handle(&self, message: &Message) {
        (self.0)(message.clone()).await
    }
}

/// Wrap an async closure as a [`MessageHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Bus counters since the last `initialize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommStats {
    pub total_messages: u64,
    pub broadcast_messages: u64,
    pub direct_messages: u64,
    /// Handler invocations completed.
    pub delivered: u64,
    pub subscribers: usize,
}

struct Counters {
    total: AtomicU64,
    broadcast: AtomicU64,
    direct: AtomicU64,
    delivered: AtomicU64,
    pending: watch::Sender<u64>,
}

impl Counters {
    fn new() -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            total: AtomicU64::new(0),
            broadcast: AtomicU64::new(0),
            direct: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            pending,
        }
    }

    fn reset(&self) {
        self.total.store(0, Ordering::SeqCst);
        self.broadcast.store(0, Ordering::SeqCst);
        self.direct.store(0, Ordering::SeqCst);
        self.delivered.store(0, Ordering::SeqCst);
        self.pending.send_replace(0);
    }

    fn enqueued(&self) {
        self.pending.send_modify(|n| *n += 1);
    }

    fn settled(&self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

type HandlerList = Arc<RwLock<Vec<Arc<dyn MessageHandler>>>>;

struct Destination {
    handlers: HandlerList,
    queue: mpsc::UnboundedSender<Message>,
    drain: JoinHandle<()>,
}

/// Message bus, shared memory and event hooks for one coordination context.
///
/// `initialize` must be called before any bus or shared-memory operation;
/// `shutdown` cancels pending deliveries and clears subscriptions.
pub struct InterAgentCommunication {
    initialized: AtomicBool,
    destinations: RwLock<HashMap<String, Destination>>,
    subscriber_count: AtomicUsize,
    memory: SharedMemory,
    hooks: EventHooks,
    counters: Arc<Counters>,
}

impl Default for InterAgentCommunication {
    fn default() -> Self {
        Self::new()
    }
}

impl InterAgentCommunication {
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            destinations: RwLock::new(HashMap::new()),
            subscriber_count: AtomicUsize::new(0),
            memory: SharedMemory::new(),
            hooks: EventHooks::new(),
            counters: Arc::new(Counters::new()),
        }
    }

    /// Open the bus. Counters restart from zero; a second call is a no-op.
    pub async fn initialize(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        self.counters.reset();
        debug!("communication layer initialized");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Close the bus: abort queued deliveries, drop subscriptions and wipe
    /// shared memory. Idempotent.
    pub async fn shutdown(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut destinations = self.destinations.write().await;
        for (agent_id, destination) in destinations.drain() {
            destination.drain.abort();
            debug!(agent_id = %agent_id, "subscription dropped on shutdown");
        }
        self.subscriber_count.store(0, Ordering::SeqCst);
        self.counters.pending.send_replace(0);
        self.memory.clear().await;
    }

    fn ensure_initialized(&self) -> CommResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(CommError::NotInitialized)
        }
    }

    /// Register `handler` for messages addressed to `agent_id` and for
    /// broadcasts. Several handlers may share one agent id; they run in
    /// registration order.
    #[instrument(skip(self, handler))]
    pub async fn subscribe(
        &self,
        agent_id: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> CommResult<()> {
        self.ensure_initialized()?;
        let mut destinations = self.destinations.write().await;

        if let Some(existing) = destinations.get(agent_id) {
            existing.handlers.write().await.push(handler);
            return Ok(());
        }

        let handlers: HandlerList = Arc::new(RwLock::new(vec![handler]));
        let (queue, receiver) = mpsc::unbounded_channel();
        let drain = tokio::spawn(drain_queue(
            agent_id.to_string(),
            receiver,
            Arc::clone(&handlers),
            Arc::clone(&self.counters),
        ));

        destinations.insert(
            agent_id.to_string(),
            Destination {
                handlers,
                queue,
                drain,
            },
        );
        self.subscriber_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Remove every handler for `agent_id`. Messages already queued for it
    /// are still delivered. Returns whether a subscription existed.
    pub async fn unsubscribe(&self, agent_id: &str) -> CommResult<bool> {
        self.ensure_initialized()?;
        // Dropping the queue sender lets the drain task finish and exit.
        let removed = self.destinations.write().await.remove(agent_id);
        if removed.is_some() {
            self.subscriber_count.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(removed.is_some())
    }

    /// Deliver `message` to the handlers of `message.to_agent_id`.
    ///
    /// A message without a recipient is broadcast.
    pub async fn publish(&self, message: Message) -> CommResult<()> {
        self.ensure_initialized()?;
        let Some(to) = message.to_agent_id.clone() else {
            return self.broadcast(message).await.map(|_| ());
        };

        let destinations = self.destinations.read().await;
        let destination = destinations
            .get(&to)
            .ok_or_else(|| CommError::NoSubscriber(to.clone()))?;

        self.counters.total.fetch_add(1, Ordering::SeqCst);
        self.counters.direct.fetch_add(1, Ordering::SeqCst);
        obs::emit_message_published(
            &message.from_agent_id,
            Some(to.as_str()),
            message.message_type,
        );
        self.hooks.emit("message:published", &message_summary(&message));
        self.enqueue(&to, destination, message);
        Ok(())
    }

    /// Deliver `message` to every subscribed destination, ignoring
    /// `to_agent_id`. Returns the number of destinations reached.
    pub async fn broadcast(&self, mut message: Message) -> CommResult<usize> {
        self.ensure_initialized()?;
        message.to_agent_id = None;

        let destinations = self.destinations.read().await;
        self.counters.total.fetch_add(1, Ordering::SeqCst);
        self.counters.broadcast.fetch_add(1, Ordering::SeqCst);
        obs::emit_message_published(&message.from_agent_id, None, message.message_type);
        self.hooks.emit("message:broadcast", &message_summary(&message));

        for (agent_id, destination) in destinations.iter() {
            self.enqueue(agent_id, destination, message.clone());
        }
        Ok(destinations.len())
    }

    fn enqueue(&self, agent_id: &str, destination: &Destination, message: Message) {
        self.counters.enqueued();
        if destination.queue.send(message).is_err() {
            warn!(agent_id = %agent_id, "delivery queue closed; message dropped");
            self.counters.settled();
        }
    }

    /// Wait until every queued delivery has been handled.
    pub async fn wait_for_deliveries(&self) {
        let mut pending = self.counters.pending.subscribe();
        let _ = pending.wait_for(|n| *n == 0).await;
    }

    pub async fn set_shared_memory(&self, key: impl Into<String>, value: Value) -> CommResult<()> {
        self.ensure_initialized()?;
        self.memory.set(key, value).await;
        Ok(())
    }

    pub async fn get_shared_memory(&self, key: &str) -> CommResult<Option<Value>> {
        self.ensure_initialized()?;
        Ok(self.memory.get(key).await)
    }

    /// Remove `key`; returns whether it was present.
    pub async fn delete_shared_memory(&self, key: &str) -> CommResult<bool> {
        self.ensure_initialized()?;
        Ok(self.memory.delete(key).await.is_some())
    }

    /// Register a synchronous listener for a named event.
    pub fn on<F>(&self, event: impl Into<String>, listener: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.hooks.on(event, listener);
    }

    /// Fire a named event; returns the number of listeners invoked.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        self.hooks.emit(event, payload)
    }

    pub fn stats(&self) -> CommStats {
        CommStats {
            total_messages: self.counters.total.load(Ordering::SeqCst),
            broadcast_messages: self.counters.broadcast.load(Ordering::SeqCst),
            direct_messages: self.counters.direct.load(Ordering::SeqCst),
            delivered: self.counters.delivered.load(Ordering::SeqCst),
            subscribers: self.subscriber_count.load(Ordering::SeqCst),
        }
    }
}

impl Drop for InterAgentCommunication {
    fn drop(&mut self) {
        for destination in self.destinations.get_mut().values() {
            destination.drain.abort();
        }
    }
}

async fn drain_queue(
    agent_id: String,
    mut receiver: mpsc::UnboundedReceiver<Message>,
    handlers: HandlerList,
    counters: Arc<Counters>,
) {
    while let Some(message) = receiver.recv().await {
        let snapshot: Vec<Arc<dyn MessageHandler>> = handlers.read().await.clone();
        for handler in snapshot {
            // a panicking handler must not take the queue down with it
            if AssertUnwindSafe(handler.handle(&message))
                .catch_unwind()
                .await
                .is_err()
            {
                warn!(
                    agent_id = %agent_id,
                    message_id = %message.id,
                    "message handler panicked"
                );
                continue;
            }
            counters.delivered.fetch_add(1, Ordering::SeqCst);
        }
        debug!(agent_id = %agent_id, message_id = %message.id, "message delivered");
        counters.settled();
    }
}

fn message_summary(message: &Message) -> Value {
    json!({
        "id": message.id,
        "from": message.from_agent_id,
        "to": message.to_agent_id,
        "type": message.message_type,
    })
}
