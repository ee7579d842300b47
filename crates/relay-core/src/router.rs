//! Event router: demultiplexes typed events onto per-topic handler slots.
//!
//! Each topic gets its own queue and worker task, so handlers for one
//! topic run strictly sequentially while topics proceed concurrently.
//! Fork events take the quiesce write lock before dispatching: every
//! other worker holds a read lock while handling an event, so the fork
//! handler waits for in-flight handlers (with a bounded grace period)
//! and blocks new dispatch until the rollback completes.
//!
//! Dispatch policy on handler errors: benign duplicates are swallowed,
//! illegal transitions are logged and dropped, integrity violations halt
//! the service via the watch channel. Everything else is logged and the
//! worker continues.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use relay_common::{
    CutoffEvent, ForkEvent, Order, OrderCancelledEvent, OrderFilledEvent, RingMinedEvent,
};

use crate::error::RelayError;

/// The six logical topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    GatewayNewOrder,
    RingMined,
    OrderFilled,
    OrderCancelled,
    CutoffChanged,
    Fork,
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topic::GatewayNewOrder => write!(f, "gateway_new_order"),
            Topic::RingMined => write!(f, "ring_mined"),
            Topic::OrderFilled => write!(f, "order_filled"),
            Topic::OrderCancelled => write!(f, "order_cancelled"),
            Topic::CutoffChanged => write!(f, "cutoff_changed"),
            Topic::Fork => write!(f, "fork"),
        }
    }
}

/// An event routed to one topic.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    NewOrder(Box<Order>),
    RingMined(RingMinedEvent),
    Filled(OrderFilledEvent),
    Cancelled(OrderCancelledEvent),
    Cutoff(CutoffEvent),
    Fork(ForkEvent),
}

impl ChainEvent {
    pub fn topic(&self) -> Topic {
        match self {
            ChainEvent::NewOrder(_) => Topic::GatewayNewOrder,
            ChainEvent::RingMined(_) => Topic::RingMined,
            ChainEvent::Filled(_) => Topic::OrderFilled,
            ChainEvent::Cancelled(_) => Topic::OrderCancelled,
            ChainEvent::Cutoff(_) => Topic::CutoffChanged,
            ChainEvent::Fork(_) => Topic::Fork,
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: ChainEvent) -> Result<(), RelayError>;
}

#[derive(Clone)]
struct HandlerSlot {
    handler: Arc<dyn EventHandler>,
    /// Concurrent slots are spawned off the worker; serialized slots run
    /// inline and preserve per-topic ordering.
    concurrent: bool,
}

pub struct EventRouter {
    registry: Mutex<HashMap<Topic, Vec<HandlerSlot>>>,
    senders: Mutex<HashMap<Topic, mpsc::UnboundedSender<ChainEvent>>>,
    quiesce: Arc<RwLock<()>>,
    halted_tx: watch::Sender<bool>,
    grace: Duration,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl EventRouter {
    pub fn new(grace: Duration) -> Self {
        let (halted_tx, _) = watch::channel(false);
        Self {
            registry: Mutex::new(HashMap::new()),
            senders: Mutex::new(HashMap::new()),
            quiesce: Arc::new(RwLock::new(())),
            halted_tx,
            grace,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Register a serialized handler on a topic. Must happen before
    /// `start`; handlers run in registration order.
    pub fn subscribe(&self, topic: Topic, handler: Arc<dyn EventHandler>) {
        self.subscribe_with(topic, handler, false);
    }

    pub fn subscribe_with(&self, topic: Topic, handler: Arc<dyn EventHandler>, concurrent: bool) {
        self.registry.lock().entry(topic).or_default().push(HandlerSlot {
            handler,
            concurrent,
        });
    }

    /// Spawn one worker per subscribed topic. Idempotent.
    pub fn start(&self) {
        let mut senders = self.senders.lock();
        if !senders.is_empty() {
            return;
        }
        let registry = self.registry.lock();
        let mut workers = self.workers.lock();
        for (&topic, slots) in registry.iter() {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(topic, tx);
            workers.push(tokio::spawn(run_topic(
                topic,
                rx,
                slots.clone(),
                self.quiesce.clone(),
                self.halted_tx.clone(),
                self.grace,
            )));
        }
        info!(topics = senders.len(), "event router started");
    }

    /// Stop accepting events; workers exit after draining their queues.
    pub fn stop(&self) {
        self.senders.lock().clear();
        info!("event router stopped");
    }

    /// Enqueue an event for its topic. Returns false if the router is not
    /// started, halted, or the topic has no handlers.
    pub fn post(&self, event: ChainEvent) -> bool {
        if *self.halted_tx.borrow() {
            warn!(topic = %event.topic(), "event router halted, dropping event");
            return false;
        }
        let topic = event.topic();
        let senders = self.senders.lock();
        match senders.get(&topic) {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                warn!(topic = %topic, "no subscriber for topic, dropping event");
                false
            }
        }
    }

    /// Observe the fatal-halt signal.
    pub fn halted(&self) -> watch::Receiver<bool> {
        self.halted_tx.subscribe()
    }

    pub fn is_halted(&self) -> bool {
        *self.halted_tx.borrow()
    }
}

async fn run_topic(
    topic: Topic,
    mut rx: mpsc::UnboundedReceiver<ChainEvent>,
    slots: Vec<HandlerSlot>,
    quiesce: Arc<RwLock<()>>,
    halted_tx: watch::Sender<bool>,
    grace: Duration,
) {
    let halted_rx = halted_tx.subscribe();
    while let Some(event) = rx.recv().await {
        if *halted_rx.borrow() {
            break;
        }
        let fatal = if topic == Topic::Fork {
            // Exclusive access: wait for in-flight handlers. The grace
            // period bounds the complaint, not the wait; a reader only
            // holds the lock for one dispatch.
            let _guard = match timeout(grace, quiesce.write()).await {
                Ok(guard) => guard,
                Err(_) => {
                    warn!(grace_ms = grace.as_millis() as u64, "fork quiesce exceeded grace period, still waiting");
                    quiesce.write().await
                }
            };
            dispatch(topic, &slots, event, &halted_tx).await
        } else {
            let _guard = quiesce.read().await;
            dispatch(topic, &slots, event, &halted_tx).await
        };
        if fatal {
            error!(topic = %topic, "integrity violation, halting service");
            halted_tx.send_replace(true);
            break;
        }
    }
    debug!(topic = %topic, "topic worker exited");
}

/// Run every slot for one event. Returns true on a fatal error.
async fn dispatch(
    topic: Topic,
    slots: &[HandlerSlot],
    event: ChainEvent,
    halted_tx: &watch::Sender<bool>,
) -> bool {
    for slot in slots {
        if slot.concurrent {
            let handler = slot.handler.clone();
            let event = event.clone();
            let halted_tx = halted_tx.clone();
            tokio::spawn(async move {
                if let Err(err) = handler.handle(event).await {
                    log_handler_error(topic, &err);
                    if err.is_fatal() {
                        halted_tx.send_replace(true);
                    }
                }
            });
        } else if let Err(err) = slot.handler.handle(event.clone()).await {
            log_handler_error(topic, &err);
            if err.is_fatal() {
                return true;
            }
        }
    }
    false
}

fn log_handler_error(topic: Topic, err: &RelayError) {
    match err {
        err if err.is_benign() => debug!(topic = %topic, error = %err, "benign handler error"),
        RelayError::IllegalTransition { .. } => {
            warn!(topic = %topic, error = %err, "illegal transition dropped")
        }
        err => error!(topic = %topic, error = %err, "handler error"),
    }
}
