// src/engine/services.rs

//! Process-wide services with an explicit lifecycle.
//!
//! [`Services::start`] creates the event bus and a scheduler publishing into
//! it; [`Services::shutdown`] stops accepting jobs, waits for running ones,
//! and only then closes the bus so every terminal event reaches subscribers.

use std::sync::Arc;

use tracing::info;

use super::pool::WorkerPool;
use super::scheduler::Scheduler;
use crate::bus::{BusConfig, EventBus};
use crate::exec::WorkerBackend;
use crate::fs::FileSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    pub workers: usize,
    pub bus: BusConfig,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            workers: super::pool::default_size(),
            bus: BusConfig::default(),
        }
    }
}

pub struct Services {
    bus: EventBus,
    scheduler: Scheduler,
}

impl Services {
    /// Must be called inside a Tokio runtime.
    pub fn start(
        options: ServiceOptions,
        backend: Arc<dyn WorkerBackend>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let bus = EventBus::new(options.bus);
        let scheduler = Scheduler::new(
            WorkerPool::new(options.workers),
            backend,
            bus.publisher(),
            fs,
        );
        info!(workers = scheduler.pool().size(), "services started");
        Self { bus, scheduler }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
        self.bus.shutdown().await;
    }
}
