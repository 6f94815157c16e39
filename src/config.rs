//! # Global runtime configuration.
//!
//! [`RuntimeConfig`] identifies this member (name, group, aliases) and carries
//! the process-level tunables of the runtime: the offline marker location,
//! the lifecycle ordering scan cap, and the drain-worker settings in
//! [`DrainConfig`].
//!
//! None of this is persisted state; all runtime state is in-memory and
//! rebuilt on restart.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use stevedore::{DrainConfig, RuntimeConfig, Severity};
//!
//! let mut cfg = RuntimeConfig::new("alpha", "main");
//! cfg.aliases.push("primary".into());
//! cfg.drain.poll_interval = Duration::from_secs(2);
//! cfg.drain.severity_threshold = Severity::Warning;
//!
//! assert_eq!(cfg.drain.capacity, 500);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::events::Severity;

/// Global configuration for the runtime.
///
/// Identifies this member within its cluster and controls lifecycle ordering
/// and drain-worker behavior.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Name of this member, used for cluster task targeting.
    pub name: String,
    /// Group this member belongs to.
    pub group: String,
    /// Additional names this member answers to when resolving task targets.
    pub aliases: Vec<String>,
    /// Marker file toggling offline mode across restarts; `None` disables
    /// the marker (offline mode is then purely in-memory).
    pub offline_marker: Option<PathBuf>,
    /// When set, deferred-batch processing skips artifact startup entirely
    /// (eager services still run).
    pub disable_startup: bool,
    /// Full-pass ceiling for the lifecycle ordering loop; `None` derives the
    /// cap from the batch size (n² + 1 passes).
    pub order_scan_cap: Option<usize>,
    /// Settings shared by all drain workers.
    pub drain: DrainConfig,
}

impl RuntimeConfig {
    /// Creates a configuration for a member with the given name and group,
    /// with default tunables.
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            aliases: Vec::new(),
            offline_marker: None,
            disable_startup: false,
            order_scan_cap: None,
            drain: DrainConfig::default(),
        }
    }
}

/// Tunables for [`DrainWorker`](crate::drain::DrainWorker) instances.
///
/// Event and metric streams are considered best-effort and high-volume;
/// these defaults prefer shedding load over blocking producers.
#[derive(Clone, Copy, Debug)]
pub struct DrainConfig {
    /// How long the worker sleeps between delivery attempts.
    pub poll_interval: Duration,
    /// Minimum spacing between busy wake-ups; repeated wake-ups below this
    /// interval are suppressed to avoid wasting cycles when the consumer is
    /// down.
    pub interrupt_cooldown: Duration,
    /// Buffer size above which the worker is woken early.
    pub busy_threshold: usize,
    /// Hard buffer ceiling; beyond it the oldest item is evicted.
    pub capacity: usize,
    /// Items below this severity are not buffered at all.
    pub severity_threshold: Severity,
    /// Whether a failed delivery drops the batch (`true`) or terminates the
    /// worker (`false`).
    pub skip_on_error: bool,
}

impl Default for DrainConfig {
    /// Provides the stock drain settings:
    /// - `poll_interval = 5s`
    /// - `interrupt_cooldown = 1s`
    /// - `busy_threshold = 50`
    /// - `capacity = 500`
    /// - `severity_threshold = Info`
    /// - `skip_on_error = true`
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            interrupt_cooldown: Duration::from_secs(1),
            busy_threshold: 50,
            capacity: 500,
            severity_threshold: Severity::Info,
            skip_on_error: true,
        }
    }
}
