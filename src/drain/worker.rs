//! # Per-consumer drain worker.
//!
//! One worker owns one consumer and one bounded buffer. Submission is cheap
//! and never waits on the consumer, except for the priority fast path where
//! the producer explicitly opts into synchronous delivery by severity.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::DrainConfig;
use crate::drain::consumer::{DrainConsumer, DrainError, DrainItem};
use crate::error::RuntimeError;
use crate::events::Severity;

/// Buffers items for one consumer and drains them in batches.
pub struct DrainWorker<T: DrainItem> {
    consumer: Arc<dyn DrainConsumer<T>>,
    config: DrainConfig,
    priority: Option<Severity>,
    buffer: Mutex<VecDeque<T>>,
    evicted: AtomicU64,
    wake: Notify,
    last_wake: Mutex<Option<Instant>>,
    cancel: CancellationToken,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl<T: DrainItem> DrainWorker<T> {
    /// Creates a worker for the given consumer.
    ///
    /// `priority` is the severity at or above which items bypass the buffer
    /// and are delivered synchronously; `None` disables the fast path.
    pub fn new(
        consumer: Arc<dyn DrainConsumer<T>>,
        config: DrainConfig,
        priority: Option<Severity>,
    ) -> Arc<Self> {
        Arc::new(Self {
            consumer,
            config,
            priority,
            buffer: Mutex::new(VecDeque::new()),
            evicted: AtomicU64::new(0),
            wake: Notify::new(),
            last_wake: Mutex::new(None),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// The consumer id this worker drains into.
    pub fn consumer_id(&self) -> &str {
        self.consumer.id()
    }

    /// Number of items currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.lock().expect("buffer lock poisoned").len()
    }

    /// Number of items shed because the buffer hit its capacity.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::SeqCst)
    }

    /// Whether the drain loop has exited.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Submits one item.
    ///
    /// Severity filtering and the priority fast path apply only to items
    /// that carry a severity. A fast-path delivery failure surfaces to the
    /// producer as [`RuntimeError::DrainRejected`]; buffered submission
    /// always succeeds.
    pub async fn submit(&self, item: T) -> Result<(), RuntimeError> {
        if let Some(severity) = item.severity() {
            if severity < self.config.severity_threshold {
                return Ok(());
            }
            if let Some(priority) = self.priority {
                if severity >= priority {
                    return self
                        .consumer
                        .deliver(std::slice::from_ref(&item))
                        .await
                        .map(|_| ())
                        .map_err(|err| RuntimeError::DrainRejected {
                            consumer: self.consumer.id().to_string(),
                            source: err.into_service_error(),
                        });
                }
            }
        }

        let over_busy = {
            let mut buffer = self.buffer.lock().expect("buffer lock poisoned");
            buffer.push_back(item);
            if buffer.len() > self.config.capacity {
                buffer.pop_front();
                let total = self.evicted.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(
                    consumer = self.consumer.id(),
                    evicted = total,
                    "drain buffer full, evicting oldest item"
                );
            }
            buffer.len() > self.config.busy_threshold
        };

        if over_busy {
            self.wake_with_cooldown();
        }
        Ok(())
    }

    /// Wakes the loop early, at most once per cooldown interval.
    fn wake_with_cooldown(&self) {
        let mut last = self.last_wake.lock().expect("wake lock poisoned");
        let now = Instant::now();
        let due = last
            .map(|at| now.duration_since(at) >= self.config.interrupt_cooldown)
            .unwrap_or(true);
        if due {
            *last = Some(now);
            self.wake.notify_one();
        }
    }

    /// Spawns the drain loop; a second call is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move { this.run().await });
    }

    /// Requests the loop to stop after the current round.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    async fn run(&self) {
        debug!(consumer = self.consumer.id(), "drain worker started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = self.wake.notified() => {}
            }

            let batch: Vec<T> = {
                let buffer = self.buffer.lock().expect("buffer lock poisoned");
                buffer.iter().cloned().collect()
            };
            if batch.is_empty() {
                continue;
            }

            match self.consumer.deliver(&batch).await {
                Ok(true) => self.discard(batch.len()),
                // received but not handled, offer again next round
                Ok(false) => {}
                Err(DrainError::Unavailable { reason }) => {
                    warn!(
                        consumer = self.consumer.id(),
                        reason, "drain consumer unavailable, stopping worker"
                    );
                    break;
                }
                Err(DrainError::Service(err)) => {
                    if self.config.skip_on_error {
                        warn!(
                            consumer = self.consumer.id(),
                            error = %err,
                            dropped = batch.len(),
                            "drain delivery failed, dropping batch"
                        );
                        self.discard(batch.len());
                    } else {
                        error!(
                            consumer = self.consumer.id(),
                            error = %err,
                            "drain delivery failed, stopping worker"
                        );
                        break;
                    }
                }
            }
        }
        self.stopped.store(true, Ordering::SeqCst);
        debug!(consumer = self.consumer.id(), "drain worker stopped");
    }

    /// Removes the first `count` items; later arrivals stay buffered.
    fn discard(&self, count: usize) {
        let mut buffer = self.buffer.lock().expect("buffer lock poisoned");
        for _ in 0..count.min(buffer.len()) {
            buffer.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::events::RuntimeEvent;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Consumer replaying scripted outcomes, then succeeding.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<bool, DrainError>>>,
        batches: Mutex<Vec<Vec<RuntimeEvent>>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<bool, DrainError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                batches: Mutex::new(Vec::new()),
            })
        }

        fn delivered(&self) -> usize {
            self.batches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DrainConsumer<RuntimeEvent> for Scripted {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn deliver(&self, batch: &[RuntimeEvent]) -> Result<bool, DrainError> {
            self.batches.lock().unwrap().push(batch.to_vec());
            self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(true))
        }
    }

    fn event(severity: Severity) -> RuntimeEvent {
        RuntimeEvent::new("TEST", severity)
    }

    fn fast_config() -> DrainConfig {
        DrainConfig {
            poll_interval: Duration::from_millis(10),
            interrupt_cooldown: Duration::from_millis(10),
            ..DrainConfig::default()
        }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..400 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_items_below_threshold_are_dropped() {
        let consumer = Scripted::new(vec![]);
        let worker = DrainWorker::new(consumer.clone(), DrainConfig::default(), None);
        worker.submit(event(Severity::Debug)).await.unwrap();
        assert_eq!(worker.buffered(), 0);
        worker.submit(event(Severity::Info)).await.unwrap();
        assert_eq!(worker.buffered(), 1);
    }

    #[tokio::test]
    async fn test_priority_fast_path_bypasses_buffer() {
        let consumer = Scripted::new(vec![]);
        let worker = DrainWorker::new(
            consumer.clone(),
            DrainConfig::default(),
            Some(Severity::Alert),
        );
        // no loop running, yet the alert lands immediately
        worker.submit(event(Severity::Alert)).await.unwrap();
        assert_eq!(consumer.delivered(), 1);
        assert_eq!(worker.buffered(), 0);

        worker.submit(event(Severity::Error)).await.unwrap();
        assert_eq!(consumer.delivered(), 1);
        assert_eq!(worker.buffered(), 1);
    }

    #[tokio::test]
    async fn test_priority_delivery_failure_surfaces_to_producer() {
        let consumer = Scripted::new(vec![Err(DrainError::Service(ServiceError::remote("no")))]);
        let worker = DrainWorker::new(consumer, DrainConfig::default(), Some(Severity::Alert));
        let err = worker.submit(event(Severity::Alert)).await.unwrap_err();
        assert_eq!(err.as_label(), "drain_rejected");
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let consumer = Scripted::new(vec![]);
        let config = DrainConfig {
            capacity: 3,
            busy_threshold: 100,
            ..DrainConfig::default()
        };
        let worker = DrainWorker::new(consumer, config, None);
        for _ in 0..5 {
            worker.submit(event(Severity::Info)).await.unwrap();
        }
        assert_eq!(worker.buffered(), 3);
        assert_eq!(worker.evicted(), 2);
    }

    #[tokio::test]
    async fn test_busy_wake_delivers_before_poll_interval() {
        let consumer = Scripted::new(vec![]);
        let config = DrainConfig {
            poll_interval: Duration::from_secs(3600),
            interrupt_cooldown: Duration::from_millis(1),
            busy_threshold: 2,
            ..DrainConfig::default()
        };
        let worker = DrainWorker::new(consumer.clone(), config, None);
        worker.start();
        for _ in 0..4 {
            worker.submit(event(Severity::Info)).await.unwrap();
        }
        wait_until(|| consumer.delivered() >= 1).await;
        assert!(!worker.is_stopped());
    }

    #[tokio::test]
    async fn test_unhandled_batch_is_retained_and_redelivered() {
        let consumer = Scripted::new(vec![Ok(false), Ok(true)]);
        let worker = DrainWorker::new(consumer.clone(), fast_config(), None);
        worker.submit(event(Severity::Info)).await.unwrap();
        worker.start();

        wait_until(|| consumer.delivered() >= 2).await;
        wait_until(|| worker.buffered() == 0).await;
    }

    #[tokio::test]
    async fn test_skip_on_error_drops_batch_and_keeps_running() {
        let consumer = Scripted::new(vec![Err(DrainError::Service(ServiceError::remote("no")))]);
        let worker = DrainWorker::new(consumer.clone(), fast_config(), None);
        worker.submit(event(Severity::Info)).await.unwrap();
        worker.start();

        wait_until(|| worker.buffered() == 0).await;
        assert!(!worker.is_stopped());
    }

    #[tokio::test]
    async fn test_strict_error_policy_stops_worker() {
        let consumer = Scripted::new(vec![Err(DrainError::Service(ServiceError::remote("no")))]);
        let config = DrainConfig {
            skip_on_error: false,
            ..fast_config()
        };
        let worker = DrainWorker::new(consumer, config, None);
        worker.submit(event(Severity::Info)).await.unwrap();
        worker.start();

        wait_until(|| worker.is_stopped()).await;
        // strict mode leaves the failed batch in place
        assert_eq!(worker.buffered(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_consumer_stops_worker() {
        let consumer = Scripted::new(vec![Err(DrainError::Unavailable {
            reason: "unloaded".into(),
        })]);
        let worker = DrainWorker::new(consumer, fast_config(), None);
        worker.submit(event(Severity::Info)).await.unwrap();
        worker.start();
        wait_until(|| worker.is_stopped()).await;
    }

    #[tokio::test]
    async fn test_items_submitted_during_delivery_survive() {
        let consumer = Scripted::new(vec![]);
        let config = DrainConfig {
            poll_interval: Duration::from_secs(3600),
            busy_threshold: 100,
            ..DrainConfig::default()
        };
        let worker = DrainWorker::new(consumer, config, None);
        for _ in 0..3 {
            worker.submit(event(Severity::Info)).await.unwrap();
        }
        // only what was snapshot is discarded
        worker.discard(2);
        assert_eq!(worker.buffered(), 1);
    }
}
