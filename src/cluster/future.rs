//! # Result correlation latch.
//!
//! A [`ResultFuture`] is registered under a run id before a correlated task
//! goes out, expecting a fixed number of results (one for a point-to-point
//! run, the member count for a broadcast). Results are appended as they
//! arrive on the result topic; waiters wake once the count is reached.
//!
//! Cancelling lowers the expectation to what has already arrived, so a
//! caller that has seen enough can release its waiters early. Cancel is
//! idempotent and has no effect once the latch is done.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::cluster::task::TaskResult;
use crate::error::RuntimeError;

// effectively "wait forever" while still being interruptible
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

struct Inner {
    expected: usize,
    results: Vec<TaskResult>,
    cancelled: bool,
}

/// Latch collecting the results of one correlated run.
pub struct ResultFuture {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl ResultFuture {
    /// Creates a latch expecting the given number of results.
    pub fn new(expected: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                expected,
                results: Vec::new(),
                cancelled: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Appends one result; wakes waiters when the expectation is reached.
    pub fn add_result(&self, result: TaskResult) {
        let done = {
            let mut inner = self.inner.lock().expect("latch lock poisoned");
            inner.results.push(result);
            inner.results.len() >= inner.expected
        };
        if done {
            self.notify.notify_waiters();
        }
    }

    /// Lowers the expectation to the results already collected.
    pub fn cancel(&self) {
        {
            let mut inner = self.inner.lock().expect("latch lock poisoned");
            if inner.results.len() >= inner.expected {
                return;
            }
            inner.cancelled = true;
            inner.expected = inner.results.len();
        }
        self.notify.notify_waiters();
    }

    /// Whether the expected number of results has arrived (or the latch was
    /// cancelled).
    pub fn is_done(&self) -> bool {
        let inner = self.inner.lock().expect("latch lock poisoned");
        inner.results.len() >= inner.expected
    }

    /// Whether the latch was cancelled before completing.
    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().expect("latch lock poisoned").cancelled
    }

    /// Snapshot of the results collected so far.
    pub fn results(&self) -> Vec<TaskResult> {
        self.inner
            .lock()
            .expect("latch lock poisoned")
            .results
            .clone()
    }

    /// Waits until the latch is done and returns the collected results.
    ///
    /// `timeout: None` waits with the stock 365-day ceiling.
    pub async fn get(&self, timeout: Option<Duration>) -> Result<Vec<TaskResult>, RuntimeError> {
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let deadline = Instant::now() + timeout;
        loop {
            // arm the wakeup before checking, so a result landing in between
            // is not lost
            let notified = self.notify.notified();
            if self.is_done() {
                return Ok(self.results());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RuntimeError::Timeout { waited: timeout });
            }
            if tokio::time::timeout(deadline - now, notified).await.is_err() {
                return Err(RuntimeError::Timeout { waited: timeout });
            }
        }
    }
}
