// src/bus/mod.rs

//! Process-wide progress event bus.
//!
//! Workers' events enter through cloneable [`Publisher`] handles into a
//! single unbounded ingress queue. A drain task fans every event out to the
//! [`Subscription`]s attached at that moment; each one has its own bounded
//! buffer, so a slow or dropped subscriber never holds up the others.
//!
//! The bus outlives individual jobs: a terminal job event is just another
//! event. Only [`EventBus::shutdown`] ends the streams.

pub mod event;
pub mod sse;
pub mod subscriber;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::types::OverflowPolicy;

pub use event::{EventKind, JOB_TASK_NAME, ProgressEvent, WireEvent, WireKind};
pub use sse::{sse_frame, sse_stream};
pub use subscriber::Subscription;

use subscriber::{Delivery, Slot};

/// Default per-subscriber buffer size.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    pub buffer: usize,
    pub overflow: OverflowPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_SUBSCRIBER_BUFFER,
            overflow: OverflowPolicy::default(),
        }
    }
}

/// Subscriber table shared by the bus, the drain task and subscriptions.
#[derive(Debug)]
pub(crate) struct Registry {
    config: BusConfig,
    next_id: AtomicU64,
    slots: Mutex<BTreeMap<u64, Arc<Slot>>>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Arc<Slot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn detach(&self, id: u64) {
        if let Some(slot) = self.lock().remove(&id) {
            slot.close();
            debug!(subscriber = id, "subscriber detached");
        }
    }

    fn fan_out(&self, event: &ProgressEvent) {
        let mut slots = self.lock();
        let mut disconnected = Vec::new();

        for (id, slot) in slots.iter() {
            match slot.push(event.clone()) {
                Delivery::Delivered | Delivery::Closed => {}
                Delivery::Evicted => {
                    debug!(subscriber = id, job = %event.job_id, "subscriber buffer full; dropped oldest event");
                }
                Delivery::Disconnected => disconnected.push(*id),
            }
        }

        for id in disconnected {
            slots.remove(&id);
            warn!(subscriber = id, "subscriber buffer overflowed; disconnected");
        }
    }

    fn close_all(&self) {
        let mut slots = self.lock();
        for slot in slots.values() {
            slot.close();
        }
        slots.clear();
    }
}

/// Cloneable handle for pushing events into the bus. Never blocks.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl Publisher {
    /// Returns `false` if the bus has shut down and the event was discarded.
    pub fn publish(&self, event: ProgressEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// The event bus service. Must be created inside a Tokio runtime.
#[derive(Debug)]
pub struct EventBus {
    publisher: Publisher,
    registry: Arc<Registry>,
    shutdown_tx: watch::Sender<bool>,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let registry = Arc::new(Registry {
            config,
            next_id: AtomicU64::new(0),
            slots: Mutex::new(BTreeMap::new()),
        });

        let drain = tokio::spawn(drain_loop(rx, shutdown_rx, Arc::clone(&registry)));
        info!(buffer = config.buffer, overflow = ?config.overflow, "event bus started");

        Self {
            publisher: Publisher { tx },
            registry,
            shutdown_tx,
            drain: Mutex::new(Some(drain)),
        }
    }

    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    pub fn publish(&self, event: ProgressEvent) -> bool {
        self.publisher.publish(event)
    }

    /// Attach a new subscriber. It sees only events published from now on.
    pub fn subscribe(&self) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(Slot::new(
            id,
            self.registry.config.buffer,
            self.registry.config.overflow,
        ));
        self.registry.lock().insert(id, Arc::clone(&slot));
        debug!(subscriber = id, "subscriber attached");
        Subscription::new(slot, Arc::downgrade(&self.registry))
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Stop the drain loop after delivering everything already published.
    /// Subscribers then drain their buffers and observe end-of-stream.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self
            .drain
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "event bus drain task ended abnormally");
            }
        }
        info!("event bus shut down");
    }
}

async fn drain_loop(
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
    registry: Arc<Registry>,
) {
    loop {
        tokio::select! {
            biased;
            maybe = rx.recv() => match maybe {
                Some(event) => registry.fan_out(&event),
                None => break,
            },
            _ = shutdown_rx.changed() => {
                rx.close();
                while let Ok(event) = rx.try_recv() {
                    registry.fan_out(&event);
                }
                break;
            }
        }
    }
    registry.close_all();
}
