//! Error types used by the stevedore runtime and its services.
//!
//! This module defines two main error types:
//!
//! - [`RuntimeError`]: errors raised by the runtime itself (resolution,
//!   marshaling, dispatch plumbing, timeouts).
//! - [`ServiceError`]: errors raised by service or artifact invocations,
//!   carrying a stable code so they can travel inside a
//!   [`TaskResult`](crate::cluster::TaskResult) across the cluster.
//!
//! Both types provide `as_label` helpers for logging/metrics.

use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the stevedore runtime.
///
/// These represent failures in the runtime plumbing itself, as opposed to
/// failures of the services and artifacts it hosts (see [`ServiceError`]).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A referenced service id could not be resolved in the repository.
    #[error("could not find service: {id}")]
    UnknownService {
        /// The unresolved service id.
        id: String,
    },

    /// A referenced node id could not be resolved in the repository.
    #[error("could not find node: {id}")]
    UnknownNode {
        /// The unresolved node id.
        id: String,
    },

    /// A wire record or service payload could not be (de)serialized.
    #[error("could not marshal payload: {source}")]
    Marshal {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// Waiting on a [`ResultFuture`](crate::cluster::ResultFuture) exceeded its timeout.
    #[error("timed out after {waited:?}")]
    Timeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// The cluster work queue is no longer accepting tasks.
    #[error("cluster queue closed: {name}")]
    QueueClosed {
        /// Name of the closed queue.
        name: String,
    },

    /// A cluster operation was attempted on a runtime without a cluster.
    #[error("this runtime is not clustered")]
    NotClustered,

    /// An artifact start was attempted while the runtime is shutting down.
    #[error("can't start artifact during shutdown: {id}")]
    ShuttingDown {
        /// The artifact that was asked to start.
        id: String,
    },

    /// A priority (fast-path) drain delivery failed; surfaced to the producer.
    #[error("priority delivery to '{consumer}' failed: {source}")]
    DrainRejected {
        /// The consumer id that rejected the item.
        consumer: String,
        /// The underlying delivery error.
        source: ServiceError,
    },

    /// The offline marker file could not be created or removed.
    #[error("could not {action} offline marker: {source}")]
    OfflineMarker {
        /// What was attempted ("create" or "remove").
        action: &'static str,
        /// The underlying filesystem error.
        source: std::io::Error,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::UnknownService { .. } => "unknown_service",
            RuntimeError::UnknownNode { .. } => "unknown_node",
            RuntimeError::Marshal { .. } => "marshal",
            RuntimeError::Timeout { .. } => "timeout",
            RuntimeError::QueueClosed { .. } => "queue_closed",
            RuntimeError::NotClustered => "not_clustered",
            RuntimeError::ShuttingDown { .. } => "shutting_down",
            RuntimeError::DrainRejected { .. } => "drain_rejected",
            RuntimeError::OfflineMarker { .. } => "offline_marker",
        }
    }
}

/// # Error produced by a service or artifact invocation.
///
/// Carries a stable `code` alongside the message so remote callers can act
/// on it; when an invocation was dispatched across the cluster, the code and
/// message end up in the error fields of the resulting
/// [`TaskResult`](crate::cluster::TaskResult) instead of being propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ServiceError {
    /// Stable error code (e.g. `REMOTE-1`).
    pub code: String,
    /// Human-readable description, possibly multi-line.
    pub message: String,
}

impl ServiceError {
    /// Creates an error with the given code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Error for a service id that could not be resolved.
    pub fn not_found(id: &str) -> Self {
        Self::new("REMOTE-0", format!("could not find service: {id}"))
    }

    /// Error for a remote execution reported without an explicit code.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::new("REMOTE-1", message)
    }

    /// Error for output received from a remote member that could not be parsed.
    pub fn bad_payload(message: impl Into<String>) -> Self {
        Self::new("REMOTE-2", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_labels_are_stable() {
        let err = RuntimeError::UnknownService { id: "a.b".into() };
        assert_eq!(err.as_label(), "unknown_service");
        let err = RuntimeError::Timeout {
            waited: Duration::from_secs(1),
        };
        assert_eq!(err.as_label(), "timeout");
    }

    #[test]
    fn test_service_error_display_includes_code() {
        let err = ServiceError::not_found("crm.sync");
        assert_eq!(err.to_string(), "REMOTE-0: could not find service: crm.sync");
    }
}
