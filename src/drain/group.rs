//! # Consumer group fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::DrainConfig;
use crate::drain::consumer::{DrainConsumer, DrainItem};
use crate::drain::worker::DrainWorker;
use crate::error::RuntimeError;
use crate::events::{EventSink, RuntimeEvent, Severity};

/// A set of drain workers keyed by consumer id, fed as one.
///
/// Publishing fans the item out to every worker; stopped workers are pruned
/// lazily on the way. Adding a consumer under an existing id replaces (and
/// stops) the previous worker.
pub struct DrainGroup<T: DrainItem> {
    config: DrainConfig,
    priority: Option<Severity>,
    workers: Mutex<HashMap<String, Arc<DrainWorker<T>>>>,
    started: AtomicBool,
}

impl<T: DrainItem> DrainGroup<T> {
    /// Creates a group without a priority fast path.
    pub fn new(config: DrainConfig) -> Self {
        Self {
            config,
            priority: None,
            workers: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Creates a group whose workers deliver items at or above the given
    /// severity synchronously.
    pub fn with_priority(config: DrainConfig, priority: Severity) -> Self {
        Self {
            priority: Some(priority),
            ..Self::new(config)
        }
    }

    /// Adds a consumer; replaces and stops any previous worker under the
    /// same id. Joins a started group running.
    pub fn add(&self, consumer: Arc<dyn DrainConsumer<T>>) {
        let worker = DrainWorker::new(consumer, self.config, self.priority);
        if self.started.load(Ordering::SeqCst) {
            worker.start();
        }
        let previous = {
            let mut workers = self.workers.lock().expect("group lock poisoned");
            workers.insert(worker.consumer_id().to_string(), worker)
        };
        if let Some(previous) = previous {
            debug!(consumer = previous.consumer_id(), "replacing drain consumer");
            previous.stop();
        }
    }

    /// Removes and stops a consumer's worker.
    pub fn remove(&self, consumer_id: &str) {
        let removed = {
            let mut workers = self.workers.lock().expect("group lock poisoned");
            workers.remove(consumer_id)
        };
        if let Some(worker) = removed {
            worker.stop();
        }
    }

    /// Consumer ids currently in the group.
    pub fn consumer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .workers
            .lock()
            .expect("group lock poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Starts every worker; consumers added later start on add.
    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
        let workers: Vec<_> = {
            let workers = self.workers.lock().expect("group lock poisoned");
            workers.values().cloned().collect()
        };
        for worker in workers {
            worker.start();
        }
    }

    /// Stops every worker.
    pub fn stop(&self) {
        let workers: Vec<_> = {
            let workers = self.workers.lock().expect("group lock poisoned");
            workers.values().cloned().collect()
        };
        for worker in workers {
            worker.stop();
        }
    }

    /// Fans an item out to every live worker, pruning dead ones.
    ///
    /// The first priority fast-path rejection is returned after all workers
    /// have been offered the item.
    pub async fn publish(&self, item: T) -> Result<(), RuntimeError> {
        let workers: Vec<_> = {
            let mut workers = self.workers.lock().expect("group lock poisoned");
            workers.retain(|id, worker| {
                if worker.is_stopped() {
                    debug!(consumer = %id, "pruning stopped drain worker");
                    false
                } else {
                    true
                }
            });
            workers.values().cloned().collect()
        };

        let mut first_error = None;
        for worker in workers {
            if let Err(err) = worker.submit(item.clone()).await {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EventSink for DrainGroup<RuntimeEvent> {
    async fn fire(&self, event: RuntimeEvent) {
        if let Err(err) = self.publish(event).await {
            warn!(error = %err, "event delivery rejected");
        }
    }
}
