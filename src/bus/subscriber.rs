// src/bus/subscriber.rs

//! Per-subscriber bounded buffers.
//!
//! Each subscriber owns a queue the drain loop pushes into without ever
//! blocking. When the queue is full the configured [`OverflowPolicy`]
//! applies to that subscriber only.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::Stream;
use futures::stream;
use tokio::sync::Notify;

use super::Registry;
use super::event::ProgressEvent;
use crate::types::OverflowPolicy;

/// Result of offering one event to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// Delivered after evicting the oldest buffered event.
    Evicted,
    /// Buffer was full under `Disconnect`; the subscriber is now closed.
    Disconnected,
    Closed,
}

#[derive(Debug, Default)]
struct SlotState {
    queue: VecDeque<ProgressEvent>,
    dropped: u64,
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) id: u64,
    capacity: usize,
    policy: OverflowPolicy,
    state: Mutex<SlotState>,
    notify: Notify,
}

impl Slot {
    pub(crate) fn new(id: u64, capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            id,
            capacity: capacity.max(1),
            policy,
            state: Mutex::new(SlotState::default()),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, event: ProgressEvent) -> Delivery {
        let delivery = {
            let mut state = self.lock();
            if state.closed {
                return Delivery::Closed;
            }

            let mut delivery = Delivery::Delivered;
            if state.queue.len() >= self.capacity {
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        state.queue.pop_front();
                        state.dropped += 1;
                        delivery = Delivery::Evicted;
                    }
                    OverflowPolicy::Disconnect => {
                        state.closed = true;
                        delivery = Delivery::Disconnected;
                    }
                }
            }
            if delivery != Delivery::Disconnected {
                state.queue.push_back(event);
            }
            delivery
        };

        self.notify.notify_one();
        delivery
    }

    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }
}

/// A live attachment to the [`EventBus`](super::EventBus).
///
/// Receives every event published after it was created. Dropping it
/// detaches from the bus.
#[derive(Debug)]
pub struct Subscription {
    slot: Arc<Slot>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub(crate) fn new(slot: Arc<Slot>, registry: Weak<Registry>) -> Self {
        Self { slot, registry }
    }

    /// Next event, or `None` once the subscription is closed and drained.
    ///
    /// Cancel-safe: an event is only removed from the buffer when this
    /// returns it.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            let notified = self.slot.notify.notified();
            {
                let mut state = self.slot.lock();
                if let Some(event) = state.queue.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.slot.lock().queue.pop_front()
    }

    /// Events evicted from this subscriber's buffer so far.
    pub fn dropped(&self) -> u64 {
        self.slot.lock().dropped
    }

    /// True once the bus shut down or this subscriber was disconnected.
    /// Buffered events can still be received.
    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }

    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        stream::unfold(self, |mut sub| async move {
            let event = sub.recv().await?;
            Some((event, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.slot.id);
        }
    }
}
