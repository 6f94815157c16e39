//! # Structured runtime event record.
//!
//! [`RuntimeEvent`] is the payload the runtime emits about itself: member
//! join/leave, server startup, capacity warnings from hosted artifacts, and
//! whatever the deployed services want to surface. Events are serializable
//! because drain consumers receive them as part of a service input.
//!
//! ## Example
//! ```
//! use stevedore::{RuntimeEvent, Severity};
//!
//! let ev = RuntimeEvent::new("MEMBER-LEFT", Severity::Error)
//!     .with_event_name("cluster-member-left")
//!     .with_message("Member left cluster: beta (group: main)")
//!     .with_member("beta@main");
//!
//! assert_eq!(ev.code, "MEMBER-LEFT");
//! assert_eq!(ev.severity, Severity::Error);
//! ```

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::drain::DrainItem;
use crate::events::Severity;

/// A structured event emitted by the runtime or by hosted artifacts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeEvent {
    /// Stable machine-readable code (e.g. `MEMBER-JOINED`).
    pub code: String,
    /// Optional human-oriented event name (e.g. `cluster-member-joined`).
    pub event_name: Option<String>,
    /// Free-form description.
    pub message: Option<String>,
    /// Severity; drives drain filtering and the priority fast path.
    pub severity: Severity,
    /// Wall-clock creation time.
    pub created: SystemTime,
    /// The artifact this event concerns, if any.
    pub artifact_id: Option<String>,
    /// The cluster member this event concerns (`name@group`), if any.
    pub member: Option<String>,
    /// Duration of the operation the event reports on, if any.
    pub duration: Option<Duration>,
}

impl RuntimeEvent {
    /// Creates an event with the given code and severity, timestamped now.
    pub fn new(code: impl Into<String>, severity: Severity) -> Self {
        Self {
            code: code.into(),
            event_name: None,
            message: None,
            severity,
            created: SystemTime::now(),
            artifact_id: None,
            member: None,
            duration: None,
        }
    }

    /// Sets the human-oriented event name.
    #[must_use]
    pub fn with_event_name(mut self, name: impl Into<String>) -> Self {
        self.event_name = Some(name.into());
        self
    }

    /// Sets the free-form message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the artifact id this event concerns.
    #[must_use]
    pub fn with_artifact(mut self, id: impl Into<String>) -> Self {
        self.artifact_id = Some(id.into());
        self
    }

    /// Sets the cluster member key (`name@group`) this event concerns.
    #[must_use]
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    /// Sets the reported duration.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

impl DrainItem for RuntimeEvent {
    fn severity(&self) -> Option<Severity> {
        Some(self.severity)
    }
}

/// Entry point through which producers fire events into the runtime.
///
/// Implemented by [`DrainGroup<RuntimeEvent>`](crate::drain::DrainGroup), so
/// components like the cluster dispatcher can report without depending on
/// the composition root.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Fires one event; never blocks on slow consumers.
    async fn fire(&self, event: RuntimeEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let ev = RuntimeEvent::new("SERVER-STARTED", Severity::Info)
            .with_message("Server started in 3s")
            .with_duration(Duration::from_secs(3));
        assert_eq!(ev.code, "SERVER-STARTED");
        assert_eq!(ev.message.as_deref(), Some("Server started in 3s"));
        assert_eq!(ev.duration, Some(Duration::from_secs(3)));
        assert!(ev.member.is_none());
    }

    #[test]
    fn test_event_severity_feeds_drain_filtering() {
        let ev = RuntimeEvent::new("X", Severity::Alert);
        assert_eq!(DrainItem::severity(&ev), Some(Severity::Alert));
    }
}
